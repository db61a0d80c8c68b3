//! # Task lifecycle events observed from a worker.
//!
//! The [`TaskEventKind`] enum classifies the notifications a worker emits:
//! - **Task lifecycle**: received, started and the three terminal outcomes
//!   (succeeded, failed, revoked)
//! - **Worker events**: periodic heartbeats
//! - **Other**: anything else the source forwards (ignored for counting)
//!
//! The [`TaskEvent`] struct carries the task id, the optional scheduled
//! execution time (only on `received`) and diagnostic metadata.
//!
//! ## Ordering guarantees
//! Each event built in-process gets a monotonically increasing sequence number
//! (`seq`). The monitor applies events in the order the source delivers them;
//! `seq` is informational.
//!
//! ## Example
//! ```rust
//! use std::time::{Duration, SystemTime};
//! use taskpulse::{TaskEvent, TaskEventKind};
//!
//! let eta = SystemTime::now() + Duration::from_secs(5);
//! let ev = TaskEvent::new(TaskEventKind::Received)
//!     .with_task("3f1c")
//!     .with_eta(eta);
//!
//! assert_eq!(ev.kind, TaskEventKind::Received);
//! assert_eq!(ev.task.as_deref(), Some("3f1c"));
//! assert_eq!(ev.scheduled_at, Some(eta));
//! assert_eq!(ev.kind.as_str(), "task-received");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of worker events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    /// Worker took the task off the queue.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `scheduled_at`: execution time, if the task was sent with an ETA
    /// - `name`: task name
    Received,

    /// Task body began executing.
    ///
    /// Sets:
    /// - `task`: task id
    Started,

    /// Task body returned successfully.
    ///
    /// Sets:
    /// - `task`: task id
    Succeeded,

    /// Task body returned an error or panicked.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `reason`: failure message
    Failed,

    /// Task was revoked before it could run.
    ///
    /// Sets:
    /// - `task`: task id
    Revoked,

    /// Periodic worker heartbeat.
    ///
    /// Sets:
    /// - `hostname`: worker name
    /// - `active`: tasks currently executing on that worker
    Heartbeat,

    /// Any other event forwarded by the source.
    Other,
}

impl TaskEventKind {
    /// Returns the conventional wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventKind::Received => "task-received",
            TaskEventKind::Started => "task-started",
            TaskEventKind::Succeeded => "task-succeeded",
            TaskEventKind::Failed => "task-failed",
            TaskEventKind::Revoked => "task-revoked",
            TaskEventKind::Heartbeat => "worker-heartbeat",
            TaskEventKind::Other => "other",
        }
    }

    /// True for the three terminal outcomes.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEventKind::Succeeded | TaskEventKind::Failed | TaskEventKind::Revoked
        )
    }

    /// True for kinds that can change the in-flight count.
    #[inline]
    pub fn affects_count(&self) -> bool {
        matches!(self, TaskEventKind::Received | TaskEventKind::Started) || self.is_terminal()
    }
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskEventKind {
    type Err = std::convert::Infallible;

    /// Parses a wire name. Unknown names map to [`TaskEventKind::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "task-received" => TaskEventKind::Received,
            "task-started" => TaskEventKind::Started,
            "task-succeeded" => TaskEventKind::Succeeded,
            "task-failed" => TaskEventKind::Failed,
            "task-revoked" => TaskEventKind::Revoked,
            "worker-heartbeat" => TaskEventKind::Heartbeat,
            _ => TaskEventKind::Other,
        })
    }
}

/// Lifecycle event with optional metadata.
///
/// - `seq`: monotonic sequence for in-process events
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`TaskEventKind`]
#[derive(Clone, Debug)]
pub struct TaskEvent {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: TaskEventKind,
    /// Task id, absent for worker-level events.
    pub task: Option<Arc<str>>,
    /// Task name (the registered function), when known.
    pub name: Option<Arc<str>>,
    /// Scheduled execution time; only meaningful on `received`.
    pub scheduled_at: Option<SystemTime>,
    /// Human-readable reason (failure message).
    pub reason: Option<Arc<str>>,
    /// Name of the worker that emitted the event.
    pub hostname: Option<Arc<str>>,
    /// Worker-reported number of executing tasks (heartbeats).
    pub active: Option<u32>,
}

impl TaskEvent {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: TaskEventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            name: None,
            scheduled_at: None,
            reason: None,
            hostname: None,
            active: None,
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches the task name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a scheduled execution time.
    #[inline]
    pub fn with_eta(mut self, eta: SystemTime) -> Self {
        self.scheduled_at = Some(eta);
        self
    }

    /// Attaches a scheduled execution time if one is given.
    #[inline]
    pub fn with_eta_opt(mut self, eta: Option<SystemTime>) -> Self {
        self.scheduled_at = eta;
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the emitting worker's name.
    #[inline]
    pub fn with_hostname(mut self, hostname: impl Into<Arc<str>>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Attaches the worker-reported active count.
    #[inline]
    pub fn with_active(mut self, active: u32) -> Self {
        self.active = Some(active);
        self
    }

    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.kind, TaskEventKind::Heartbeat)
    }
}
