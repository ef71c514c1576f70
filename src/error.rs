//! Error types for the offload engine.
//!
//! Defines [`Error`], covering the full failure taxonomy: marshal failures
//! (before any process spawns), spawn failures, abnormal worker exits,
//! structured signals raised inside a worker, and protocol violations in
//! worker output.

use serde_json::Value;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

fn exit_reason(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

/// Errors produced by the offload engine and its futures.
///
/// Each variant carries enough context (job label, exit code, signal
/// category) to report the failure without consulting the engine.
///
/// # Examples
///
/// ```
/// use offload::Error;
///
/// let err = Error::ProcessFailed {
///     label: "backup".to_string(),
///     code: Some(7),
/// };
/// assert!(err.to_string().contains("exit code 7"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A task or captured value could not be encoded for the wire.
    ///
    /// Reported synchronously, before any process spawns.
    #[error("failed to marshal task: {source}")]
    Marshal {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The operating system refused to start the child process.
    #[error("failed to spawn '{label}': {source}")]
    Spawn {
        /// Label the job was launched under.
        label: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The child exited abnormally (non-zero status or killed by signal).
    ///
    /// Worker read failures surface here too: a worker that cannot parse
    /// its input exits non-zero without printing a result unit, so the
    /// caller sees a generic launch failure rather than a structured signal.
    #[error("process '{label}' exited abnormally: {}", exit_reason(*code))]
    ProcessFailed {
        /// Label the job was launched under.
        label: String,
        /// Exit code, or `None` when the child was killed by a signal.
        code: Option<i32>,
    },

    /// A structured signal raised inside the worker, category and payload
    /// preserved across the process boundary.
    #[error("task raised signal '{category}': {payload}")]
    Signal {
        /// Signal category; `"error"` for generic errors.
        category: String,
        /// Arbitrary payload attached at the raise site.
        payload: Value,
    },

    /// The worker exited cleanly but its output contained no parseable
    /// result unit.
    #[error("process '{label}' produced no parseable result unit")]
    Protocol {
        /// Label the job was launched under.
        label: String,
    },

    /// The outcome was already delivered to the registered callback; the
    /// future cannot yield it a second time.
    #[error("outcome already delivered to the registered callback")]
    Delivered,

    /// A capture include/exclude pattern failed to compile.
    #[error("invalid capture pattern: {source}")]
    Pattern {
        /// Underlying pattern-compilation error.
        #[from]
        source: regex::Error,
    },

    /// I/O failure while collecting the child's output.
    #[error("i/o failure on '{label}': {source}")]
    ChildIo {
        /// Label the job was launched under.
        label: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` if this is a structured signal raised by a task.
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Signal { .. })
    }

    /// Returns the signal category, if this is a task-raised signal.
    ///
    /// # Examples
    ///
    /// ```
    /// use offload::Error;
    /// use serde_json::json;
    ///
    /// let err = Error::Signal {
    ///     category: "mail-error".to_string(),
    ///     payload: json!({"code": 451}),
    /// };
    /// assert_eq!(err.signal_category(), Some("mail-error"));
    /// ```
    pub fn signal_category(&self) -> Option<&str> {
        match self {
            Self::Signal { category, .. } => Some(category),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn process_failed_display() {
        let err = Error::ProcessFailed {
            label: "x".to_string(),
            code: Some(7),
        };
        assert_eq!(err.to_string(), "process 'x' exited abnormally: exit code 7");

        let err = Error::ProcessFailed {
            label: "x".to_string(),
            code: None,
        };
        assert_eq!(
            err.to_string(),
            "process 'x' exited abnormally: killed by signal"
        );
    }

    #[test]
    fn signal_display_and_helpers() {
        let err = Error::Signal {
            category: "quota".to_string(),
            payload: json!(["inbox", 42]),
        };
        assert!(err.is_signal());
        assert_eq!(err.signal_category(), Some("quota"));
        assert!(err.to_string().contains("quota"));
        assert!(err.to_string().contains("inbox"));
    }

    #[test]
    fn non_signal_has_no_category() {
        let err = Error::Delivered;
        assert!(!err.is_signal());
        assert_eq!(err.signal_category(), None);
    }
}
