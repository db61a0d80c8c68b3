//! # taskpulse
//!
//! **Taskpulse** watches a task worker's lifecycle event stream and answers one
//! question: *is any task in flight right now?*
//!
//! It starts a worker under a background monitor, keeps a per-task record built
//! from `received`/`started`/terminal events, and exposes a two-level
//! idle/active signal that callers can poll or wait on. Tasks scheduled for
//! the future (ETA) do not count until they are due. The crate is meant for
//! integration tests and harnesses that need to wait until a worker has
//! drained its work.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │  App = EventSource            │
//!                 │      + WorkerRuntime          │  (MemoryBroker, or your own)
//!                 └──────┬───────────────┬────────┘
//!            subscribe() │               │ create_worker() / lifecycle hooks
//!                        ▼               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - registers init/ready hooks (tokens, removed on stop)           │
//! │  - Monitor (receive loop, bounded window)                         │
//! │  - runs worker entry point (run, else start)                      │
//! │  - waits for ready (startup_timeout)                              │
//! └──────┬──────────────────────────────────────────────┬─────────────┘
//!        ▼                                              ▼
//!   Monitor loop ──► LivenessTracker::apply(&ev)   MonitoredWorker
//!        │                 │                         - wait_idle / wait_active
//!        │                 ▼                         - stop / join
//!        │          watch<Liveness> Idle ⇄ Active
//!        ▼
//!   SubscriberSet ──► LogWriter / custom observers
//! ```
//!
//! ### Counting
//! ```text
//! received (no eta / eta due) ─┐
//! started ─────────────────────┼──► in flight
//! received (eta in future) ────┼──► not yet (re-checked on every receive timeout)
//! succeeded / failed / revoked ┘──► done
//!
//! in_flight: 0 → n   ⇒ Active
//! in_flight: n → 0   ⇒ Idle
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                               |
//! |-------------------|-----------------------------------------------------------------|--------------------------------------------------|
//! | **Liveness**      | Per-task records, idle/active level, waiters.                   | [`LivenessTracker`], [`Liveness`]                |
//! | **Monitoring**    | Bounded-wait receive loop with clean stop and join.             | [`Monitor`]                                      |
//! | **Supervision**   | Start a worker under a monitor; ordered teardown.               | [`Supervisor`], [`MonitoredWorker`]              |
//! | **Seams**         | Plug in any event source and worker runtime.                    | [`EventSource`], [`WorkerRuntime`], [`Lifecycle`] |
//! | **Observers**     | Hook into the event stream (logging, metrics).                  | [`Subscribe`]                                    |
//! | **In-memory**     | Broker, worker and result backend for tests and demos.          | [`MemoryBroker`], [`AsyncResult`]                |
//! | **Errors**        | Typed errors with stable labels.                                | [`SupervisorError`], [`ReceiveError`]            |
//! | **Configuration** | Centralized timeouts and sizes.                                 | [`Config`]                                       |
//!
//! ## Optional features
//! - `logging` (default): exports a built-in [`LogWriter`] observer _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::{Value, json};
//! use taskpulse::{Config, MemoryBroker, start_monitored_worker};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let broker = Arc::new(MemoryBroker::new(&cfg));
//!     broker.register("sleep", |_args: Value| async move {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         Ok(Value::Null)
//!     });
//!
//!     let worker = start_monitored_worker(broker.clone(), cfg, 4).await?;
//!
//!     let results: Vec<_> = (0..4).map(|_| broker.send("sleep", json!([]))).collect();
//!     assert!(worker.wait_active(Duration::from_secs(5)).await);
//!     assert!(worker.wait_idle(Duration::from_secs(5)).await);
//!     for r in results {
//!         r.get(Duration::from_secs(1)).await?;
//!     }
//!
//!     assert!(worker.stop_and_join().await);
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod memory;
mod runtime;
mod subscribers;

// ---- Public re-exports ----

pub use config::{Config, setup_worker};
pub use core::{
    Heartbeat, Liveness, LivenessSnapshot, LivenessTracker, Monitor, MonitoredWorker, Supervisor,
    SupervisorState, TaskRecord, TaskState, start_monitored_worker,
};
pub use error::{
    MonitorError, ReceiveError, ResultError, SupervisorError, TaskError, WorkerError,
};
pub use events::{Bus, TaskEvent, TaskEventKind};
pub use memory::{
    AsyncResult, BoxTaskFuture, MemoryBroker, MemoryConsumer, MemoryWorker, SendOptions, Task,
    TaskFn, TaskOutcome, TaskRef, TaskStatus,
};
pub use runtime::{
    App, BoxWorkerFuture, Consumer, ConsumerRef, EventSource, HookToken, Lifecycle, Subscription,
    Worker, WorkerOptions, WorkerReady, WorkerRef, WorkerRuntime,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
