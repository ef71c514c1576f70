//! Caller-visible handles to in-flight jobs.
//!
//! A [`JobFuture`] resolves exactly once, when the exit watcher delivers
//! the job's outcome through a one-shot channel. `ready` is a non-blocking
//! check, `wait` suspends on the channel (no polling loop — the runtime
//! keeps servicing other work), and `get` consumes the future.

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{Error, Result};

enum FutureState<T> {
    Pending(oneshot::Receiver<Result<T>>),
    Ready(Option<Result<T>>),
}

/// Handle to one offloaded job.
///
/// Jobs launched with a callback deliver their outcome to the callback
/// instead; the corresponding future then resolves to
/// [`Error::Delivered`].
///
/// Retrieval is single-shot by construction — `get` takes the future by
/// value, so a second retrieval is rejected at compile time:
///
/// ```compile_fail
/// # async fn demo(f: offload::JobFuture<serde_json::Value>) {
/// let first = f.get().await;
/// let second = f.get().await; // `f` was moved by the first `get`
/// # }
/// ```
pub struct JobFuture<T> {
    id: Option<u32>,
    label: String,
    state: FutureState<T>,
}

impl<T> std::fmt::Debug for JobFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobFuture")
            .field("id", &self.id)
            .field("label", &self.label)
            .field(
                "state",
                match &self.state {
                    FutureState::Pending(_) => &"pending",
                    FutureState::Ready(_) => &"ready",
                },
            )
            .finish()
    }
}

impl<T> JobFuture<T> {
    pub(crate) fn pending(
        id: Option<u32>,
        label: String,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Self {
        Self {
            id,
            label,
            state: FutureState::Pending(rx),
        }
    }

    /// OS process id of the underlying child, when the OS reported one.
    ///
    /// This is the caller's hook for out-of-band termination: the engine
    /// has no native cancellation, so killing the process by id is the
    /// supported way to abandon a job. The kill then surfaces as
    /// [`Error::ProcessFailed`] with `code: None`.
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    /// Label the job was launched under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking readiness check.
    ///
    /// Returns `true` iff the outcome has been delivered (the process
    /// exited and, for task-flavored jobs, its output was parsed). Never
    /// blocks and performs no I/O beyond draining the completion channel.
    pub fn ready(&mut self) -> bool {
        let outcome = match &mut self.state {
            FutureState::Ready(_) => return true,
            FutureState::Pending(rx) => match rx.try_recv() {
                Ok(outcome) => outcome,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Closed) => Err(Error::Delivered),
            },
        };
        self.state = FutureState::Ready(Some(outcome));
        true
    }

    /// Suspends until the outcome is delivered.
    ///
    /// Awaits the one-shot completion signal; other tasks on the runtime
    /// keep making progress while this future sleeps.
    pub async fn wait(&mut self) {
        let outcome = match &mut self.state {
            FutureState::Ready(_) => return,
            FutureState::Pending(rx) => match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Delivered),
            },
        };
        self.state = FutureState::Ready(Some(outcome));
    }

    /// Waits for completion and returns the outcome, consuming the future.
    pub async fn get(mut self) -> Result<T> {
        self.wait().await;
        match self.state {
            FutureState::Ready(Some(outcome)) => outcome,
            // wait() always leaves a stored outcome; this arm is for the
            // type system, not a reachable path.
            _ => Err(Error::Delivered),
        }
    }
}
