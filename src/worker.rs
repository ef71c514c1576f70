//! Worker-side entry point.
//!
//! The worker is a minimal fixed program: read one task line from stdin,
//! evaluate it against its bindings, print one result unit line to stdout,
//! exit. Stdout is the wire — all diagnostics go to stderr via `tracing`.
//!
//! A task that raises still exits cleanly: the signal is marshaled back as
//! a result unit for the engine to re-surface. Only input the worker
//! cannot read (EOF, malformed JSON) produces a non-zero exit, which the
//! engine reports as a generic launch failure.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::protocol::{ResultUnit, TaskUnit};

/// Exit code when no task unit could be read from stdin.
pub const EXIT_READ_FAILURE: i32 = 65;

/// Exit code when the result unit could not be written to stdout.
pub const EXIT_WRITE_FAILURE: i32 = 74;

/// Runs the read-evaluate-print-result loop body once and returns the
/// process exit code.
///
/// This is the whole worker: the `offload-worker` binary is a thin shell
/// around this function.
pub async fn run() -> i32 {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(0) => {
            tracing::error!("no task unit on stdin");
            return EXIT_READ_FAILURE;
        },
        Ok(_) => {},
        Err(err) => {
            tracing::error!(error = %err, "failed to read task unit");
            return EXIT_READ_FAILURE;
        },
    }

    let task = match TaskUnit::from_line(line.trim_end()) {
        Ok(task) => task,
        Err(err) => {
            tracing::error!(error = %err, "unparseable task unit");
            return EXIT_READ_FAILURE;
        },
    };

    if tracing::enabled!(tracing::Level::DEBUG) {
        for binding in &task.bindings {
            tracing::debug!(statement = %binding.statement(), "reproduced binding");
        }
    }

    let env = task.environment();
    let unit = match task.body.eval(&env) {
        Ok(value) => ResultUnit::Value(value),
        Err(signal) => {
            tracing::debug!(category = %signal.category, "task raised");
            ResultUnit::from(signal)
        },
    };

    let line = match unit.to_line() {
        Ok(line) => line,
        Err(err) => {
            tracing::error!(error = %err, "failed to marshal result unit");
            return EXIT_WRITE_FAILURE;
        },
    };

    let mut stdout = tokio::io::stdout();
    let write = async {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    };
    if let Err(err) = write.await {
        tracing::error!(error = %err, "failed to write result unit");
        return EXIT_WRITE_FAILURE;
    }

    0
}
