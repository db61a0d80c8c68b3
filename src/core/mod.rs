//! Monitoring core: liveness tracking, the event loop and worker supervision.
//!
//! Internal modules:
//! - [`liveness`]: per-task records and the idle/active level with waiters;
//! - [`monitor`]: bounded-wait receive loop that feeds the tracker;
//! - [`supervisor`]: starts a worker under a monitor and tears both down;
//! - [`finish`]: completion flag shared by spawned loops.

mod finish;
mod liveness;
mod monitor;
mod supervisor;

pub use liveness::{
    Heartbeat, Liveness, LivenessSnapshot, LivenessTracker, TaskRecord, TaskState,
};
pub use monitor::Monitor;
pub use supervisor::{MonitoredWorker, Supervisor, SupervisorState, start_monitored_worker};
