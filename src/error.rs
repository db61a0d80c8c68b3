//! Error types used by the monitor, the supervisor and the in-memory transport.
//!
//! - [`ReceiveError`]: what an event subscription returns when no batch is delivered.
//! - [`MonitorError`]: why the monitor loop stopped on its own.
//! - [`SupervisorError`]: start-time failures of a monitored worker.
//! - [`WorkerError`]: a worker's entry point failed.
//! - [`TaskError`]: failures of individual task bodies (in-memory transport).
//! - [`ResultError`]: failures when waiting for a task result (in-memory transport).
//!
//! Every enum provides `as_label()`, a short stable snake_case label for logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors returned by [`Subscription::receive`](crate::Subscription::receive).
///
/// `Timeout` is the expected outcome of an empty receive window and is never
/// treated as a failure. `Transport` ends the monitor loop.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    /// No event arrived within the receive window.
    #[error("receive timed out")]
    Timeout,

    /// The connection to the event source is broken.
    #[error("transport failure: {error}")]
    Transport {
        /// The underlying error message.
        error: String,
    },
}

impl ReceiveError {
    /// Shorthand for a transport failure.
    pub fn transport(error: impl Into<String>) -> Self {
        ReceiveError::Transport {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReceiveError::Timeout => "receive_timeout",
            ReceiveError::Transport { .. } => "receive_transport",
        }
    }

    /// True for the expected, recoverable timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReceiveError::Timeout)
    }
}

/// # Reasons the monitor loop terminated without being asked to.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The event source failed; the loop does not retry.
    #[error("event source failed: {error}")]
    Transport {
        /// The underlying error message.
        error: String,
    },
}

impl MonitorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            MonitorError::Transport { .. } => "monitor_transport",
        }
    }
}

/// # Errors produced when starting a monitored worker.
///
/// All of them are fatal: callers see either a working handle or one of these.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The worker offers neither a `run` nor a `start` entry point.
    #[error("worker {worker:?} has no recognized startup entry point")]
    NoStartupEntry {
        /// Name of the offending worker.
        worker: String,
    },

    /// The worker did not report ready in time.
    #[error("worker not ready after {timeout:?}")]
    ReadinessTimeout {
        /// The configured startup timeout.
        timeout: Duration,
    },

    /// Subscribing to the event source failed.
    #[error("cannot subscribe to events: {error}")]
    Subscribe {
        /// The underlying error message.
        error: String,
    },

    /// The runtime refused to create a worker.
    #[error("cannot create worker: {error}")]
    CreateWorker {
        /// The underlying error message.
        error: String,
    },

    /// The worker's entry point returned before it reported ready.
    #[error("worker exited before ready: {error}")]
    WorkerExited {
        /// The underlying error message.
        error: String,
    },

    /// `start` was called on a supervisor that already ran.
    #[error("supervisor already started")]
    AlreadyStarted,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use taskpulse::SupervisorError;
    /// use std::time::Duration;
    ///
    /// let err = SupervisorError::ReadinessTimeout { timeout: Duration::from_secs(5) };
    /// assert_eq!(err.as_label(), "supervisor_readiness_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::NoStartupEntry { .. } => "supervisor_no_startup_entry",
            SupervisorError::ReadinessTimeout { .. } => "supervisor_readiness_timeout",
            SupervisorError::Subscribe { .. } => "supervisor_subscribe",
            SupervisorError::CreateWorker { .. } => "supervisor_create_worker",
            SupervisorError::WorkerExited { .. } => "supervisor_worker_exited",
            SupervisorError::AlreadyStarted => "supervisor_already_started",
        }
    }
}

/// # Errors returned by a worker's entry point.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker could not start or crashed.
    #[error("worker failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Fail { .. } => "worker_failed",
        }
    }
}

/// # Errors produced by task bodies.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task body failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// No task is registered under this name.
    #[error("unregistered task {name:?}")]
    NotRegistered {
        /// The requested task name.
        name: String,
    },

    /// Task was cancelled because its worker terminated.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for a body failure.
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use taskpulse::TaskError;
    ///
    /// let err = TaskError::fail("boom");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::NotRegistered { .. } => "task_not_registered",
            TaskError::Canceled => "task_canceled",
        }
    }
}

/// # Errors returned when waiting for a task result.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    /// The result was not stored within the wait window.
    #[error("no result after {timeout:?}")]
    Timeout {
        /// The wait window.
        timeout: Duration,
    },

    /// The task failed.
    #[error("task failed: {error}")]
    Failed {
        /// The failure message.
        error: String,
    },

    /// The task was revoked and never ran.
    #[error("task revoked")]
    Revoked,
}

impl ResultError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResultError::Timeout { .. } => "result_timeout",
            ResultError::Failed { .. } => "result_failed",
            ResultError::Revoked => "result_revoked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(ReceiveError::Timeout.as_label(), "receive_timeout");
        assert_eq!(
            ReceiveError::transport("closed").as_label(),
            "receive_transport"
        );
        assert_eq!(
            SupervisorError::NoStartupEntry {
                worker: "w".into()
            }
            .as_label(),
            "supervisor_no_startup_entry"
        );
        assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
        assert_eq!(ResultError::Revoked.as_label(), "result_revoked");
    }

    #[test]
    fn only_timeout_is_recoverable() {
        assert!(ReceiveError::Timeout.is_timeout());
        assert!(!ReceiveError::transport("broken pipe").is_timeout());
    }

    #[test]
    fn messages_carry_details() {
        let err = ReceiveError::transport("broken pipe");
        assert_eq!(err.to_string(), "transport failure: broken pipe");
        let err = TaskError::NotRegistered {
            name: "nope".into(),
        };
        assert_eq!(err.to_string(), "unregistered task \"nope\"");
    }
}
