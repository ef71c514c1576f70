//! Process orchestration and completion handling.
//!
//! [`Engine`] spawns one dedicated child per launch — either the fixed
//! worker binary for task-flavored jobs or an arbitrary program for raw
//! launches — pipes its stdout as the job's private output buffer, and
//! attaches an exit watcher task. The watcher classifies the exit, parses
//! trailing output into a result unit for task-flavored jobs, and delivers
//! the outcome exactly once: to the registered callback if there is one,
//! otherwise through the future's one-shot channel.
//!
//! There is no queueing, pooling, retry, or concurrency cap: one launch is
//! one child is one future.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::future::JobFuture;
use crate::protocol::{parse_trailing, ResultUnit, TaskUnit};

/// Callback invoked by the exit watcher with the job's outcome.
///
/// Runs on the watcher task, once, at exit notification. A job has at most
/// one callback; when one is registered the future resolves to
/// [`Error::Delivered`] instead of the outcome.
pub type ExitCallback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Exit record for a process-flavored launch: the retrieval value is the
/// process itself, not parsed output.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    /// Label the job was launched under.
    pub label: String,
    /// OS process id, when the OS reported one.
    pub id: Option<u32>,
    /// Exit status (always successful — failures surface as
    /// [`Error::ProcessFailed`] instead).
    pub status: std::process::ExitStatus,
}

/// Orchestrates worker processes and delivers their outcomes.
///
/// # Examples
///
/// ```no_run
/// use offload::{Engine, Expr, TaskUnit};
///
/// # async fn example() -> offload::Result<()> {
/// let engine = Engine::new();
/// let task = TaskUnit::new(Expr::value(&"ping")?);
/// let future = engine.launch_task(&task, None).await?;
/// assert_eq!(future.get().await?, serde_json::json!("ping"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    worker_program: PathBuf,
    retain_buffers: bool,
    retained: Arc<Mutex<HashMap<u32, Vec<u8>>>>,
}

/// Builder for [`Engine`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    worker_program: Option<PathBuf>,
    retain_buffers: bool,
}

impl EngineBuilder {
    /// Overrides the worker binary used for task-flavored launches.
    ///
    /// Defaults to `offload-worker` next to the current executable.
    pub fn worker_program(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(path.into());
        self
    }

    /// Keeps completed output buffers for post-mortem inspection via
    /// [`Engine::retained_output`] instead of dropping them at delivery.
    pub fn retain_buffers(mut self, retain: bool) -> Self {
        self.retain_buffers = retain;
        self
    }

    /// Builds the engine.
    pub fn build(self) -> Engine {
        Engine {
            worker_program: self
                .worker_program
                .unwrap_or_else(default_worker_program),
            retain_buffers: self.retain_buffers,
            retained: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn default_worker_program() -> PathBuf {
    let name = if cfg!(windows) {
        "offload-worker.exe"
    } else {
        "offload-worker"
    };
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a customized engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Path of the worker binary used for task-flavored launches.
    pub fn worker_program(&self) -> &Path {
        &self.worker_program
    }

    /// Launches an arbitrary external program asynchronously.
    ///
    /// No result parsing happens on exit: a clean exit resolves the future
    /// to the [`ProcessExit`] record itself, a non-zero or signaled exit
    /// resolves it to [`Error::ProcessFailed`].
    pub async fn launch_process<S, I>(
        &self,
        label: impl Into<String>,
        program: impl AsRef<OsStr>,
        args: I,
        on_exit: Option<ExitCallback<ProcessExit>>,
    ) -> Result<JobFuture<ProcessExit>>
    where
        S: AsRef<OsStr>,
        I: IntoIterator<Item = S>,
    {
        let label = label.into();
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| Error::Spawn {
                label: label.clone(),
                source,
            })?;

        let id = child.id();
        tracing::debug!(label = %label, id = ?id, "launched process");

        let exit_label = label.clone();
        Ok(self.watch(label, child, on_exit, move |output| {
            Ok(ProcessExit {
                label: exit_label,
                id,
                status: output.status,
            })
        }))
    }

    /// Offloads one task to a dedicated worker process.
    ///
    /// Marshals `task` up front (marshal failures are reported here,
    /// before any process spawns), spawns the configured worker binary,
    /// writes the task line to its stdin, and closes that channel for
    /// writing. The returned future resolves to the task's value, or to
    /// [`Error::Signal`] when the task raised.
    ///
    /// A failure while feeding the worker's stdin is not reported here:
    /// the exit watcher already owns the process at that point, so the
    /// starved worker's exit surfaces through the future instead.
    pub async fn launch_task(
        &self,
        task: &TaskUnit,
        on_exit: Option<ExitCallback<Value>>,
    ) -> Result<JobFuture<Value>> {
        let label = "offload-worker".to_string();
        let line = task.to_line()?;

        let mut child = Command::new(&self.worker_program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| Error::Spawn {
                label: label.clone(),
                source,
            })?;

        let stdin = child.stdin.take();

        tracing::debug!(
            id = ?child.id(),
            bindings = task.bindings.len(),
            "launched task worker"
        );

        // Attach the watcher before feeding the task: from here on the
        // child's exit is accounted for even if the write below fails.
        let parse_label = label.clone();
        let feed_label = label.clone();
        let future = self.watch(label, child, on_exit, move |output| {
            match parse_trailing(&output.stdout) {
                Some(ResultUnit::Value(value)) => Ok(value),
                Some(ResultUnit::Signal { category, payload }) => {
                    Err(Error::Signal { category, payload })
                },
                None => Err(Error::Protocol { label: parse_label }),
            }
        });

        // The worker reads exactly one line; shutting down the handle
        // closes the pipe so the worker sees EOF after it. A worker that
        // dies before reading breaks the pipe here — the watcher reports
        // that exit, so the write failure is only worth a log line.
        if let Some(mut stdin) = stdin {
            let write = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.shutdown().await
            };
            if let Err(error) = write.await {
                tracing::warn!(label = %feed_label, error = %error, "failed to feed task to worker");
            }
        }

        Ok(future)
    }

    /// Post-mortem accessor for a retained output buffer, keyed by the
    /// job's process id. Only populated when the engine was built with
    /// [`EngineBuilder::retain_buffers`].
    pub fn retained_output(&self, id: u32) -> Option<Vec<u8>> {
        self.retained
            .lock()
            .ok()
            .and_then(|retained| retained.get(&id).cloned())
    }

    /// Attaches the exit watcher: waits for the child, classifies the
    /// exit, and delivers the outcome to the callback or the future.
    fn watch<T, F>(
        &self,
        label: String,
        child: Child,
        on_exit: Option<ExitCallback<T>>,
        classify: F,
    ) -> JobFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&Output) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = child.id();
        let future_label = label.clone();
        let retain = self.retain_buffers;
        let retained = Arc::clone(&self.retained);

        tokio::spawn(async move {
            let outcome = match child.wait_with_output().await {
                Err(source) => {
                    tracing::warn!(label = %label, error = %source, "exit watcher failed");
                    Err(Error::ChildIo { label, source })
                },
                Ok(output) => {
                    if retain {
                        if let (Some(id), Ok(mut retained)) = (id, retained.lock()) {
                            retained.insert(id, output.stdout.clone());
                        }
                    }

                    if output.status.success() {
                        tracing::debug!(label = %label, id = ?id, "process exited cleanly");
                        classify(&output)
                    } else {
                        let code = output.status.code();
                        tracing::warn!(label = %label, id = ?id, code = ?code, "process exited abnormally");
                        Err(Error::ProcessFailed { label, code })
                    }
                },
            };

            // Exactly-once delivery: callback if registered, else the
            // future's channel. A receiver dropped before completion is
            // an abandoned future, not an error.
            match on_exit {
                Some(callback) => callback(outcome),
                None => {
                    let _ = tx.send(outcome);
                },
            }
        });

        JobFuture::pending(id, future_label, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let engine = Engine::new();
        assert!(!engine.retain_buffers);
        assert!(engine
            .worker_program()
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("offload-worker")));
    }

    #[test]
    fn builder_overrides() {
        let engine = Engine::builder()
            .worker_program("/opt/offload/worker")
            .retain_buffers(true)
            .build();
        assert!(engine.retain_buffers);
        assert_eq!(engine.worker_program(), Path::new("/opt/offload/worker"));
    }

    #[test]
    fn retained_output_empty_without_retention() {
        let engine = Engine::new();
        assert_eq!(engine.retained_output(1), None);
    }
}
