//! # Worker runtime seam.
//!
//! A [`WorkerRuntime`] creates [`Worker`]s and owns the [`Lifecycle`] hook registry
//! its workers report through.
//!
//! A worker may expose a blocking-style [`Worker::run`] entry point, a
//! [`Worker::start`] entry point, or both. The supervisor prefers `run`; a worker
//! exposing neither cannot be started and is reported as a configuration error.
//!
//! ## Expected worker behavior
//! ```text
//! run()/start() future:
//!   ├─► lifecycle.emit_init(self)          (handle recorded for termination)
//!   ├─► start consumers
//!   ├─► lifecycle.emit_ready(consumers)    (unblocks Supervisor::start)
//!   └─► serve until terminate()
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::WorkerError;
use crate::runtime::lifecycle::Lifecycle;

/// Boxed future returned by worker entry points.
pub type BoxWorkerFuture = Pin<Box<dyn Future<Output = Result<(), WorkerError>> + Send + 'static>>;

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;

/// Shared handle to a task consumer created by a worker.
pub type ConsumerRef = Arc<dyn Consumer>;

/// An execution engine instance that dequeues and runs tasks.
pub trait Worker: Send + Sync + 'static {
    /// Stable, human-readable worker name.
    fn name(&self) -> &str;

    /// Blocking-style entry point: the future serves until the worker is terminated.
    ///
    /// `None` when the worker has no such entry point.
    fn run(&self) -> Option<BoxWorkerFuture> {
        None
    }

    /// Alternative entry point with the same contract as [`Worker::run`].
    fn start(&self) -> Option<BoxWorkerFuture> {
        None
    }

    /// Forcibly stops the worker. Must be safe to call more than once.
    fn terminate(&self);
}

/// Something a worker pulls tasks through.
pub trait Consumer: Send + Sync + 'static {
    /// Stops accepting new work. Work already taken keeps running.
    fn stop(&self);
}

/// Parameters the supervisor passes when creating a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Task bodies executed at once (≥ 1).
    pub concurrency: usize,
    /// Heartbeat period; `None` disables heartbeats.
    pub heartbeat: Option<Duration>,
}

impl From<&Config> for WorkerOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            concurrency: cfg.concurrency_clamped(),
            heartbeat: cfg.heartbeat(),
        }
    }
}

/// Factory for workers plus the lifecycle registry they report to.
pub trait WorkerRuntime: Send + Sync + 'static {
    /// Hook registry for `init`/`ready` notifications.
    fn lifecycle(&self) -> &Lifecycle;

    /// Creates a worker without starting it.
    fn create_worker(&self, opts: WorkerOptions) -> Result<WorkerRef, WorkerError>;
}
