//! # In-process transport.
//!
//! A self-contained broker, result backend and worker for running monitored
//! workers without external infrastructure: tests, demos, embedded use.
//!
//! - [`MemoryBroker`]: task registry, queue, results; an [`EventSource`](crate::EventSource)
//!   and a [`WorkerRuntime`](crate::WorkerRuntime)
//! - [`MemoryWorker`] / [`MemoryConsumer`]: executes queued tasks and publishes events
//! - [`AsyncResult`]: handle to a sent task's outcome
//! - [`Task`] / [`TaskFn`]: task bodies

mod broker;
mod queue;
mod result;
mod task;
mod worker;

pub use broker::{MemoryBroker, SendOptions};
pub use result::{AsyncResult, TaskOutcome, TaskStatus};
pub use task::{BoxTaskFuture, Task, TaskFn, TaskRef};
pub use worker::{MemoryConsumer, MemoryWorker};
