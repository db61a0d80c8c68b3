//! # Collaborator seams.
//!
//! The monitor never talks to a broker or a worker directly; it consumes them
//! through these traits:
//! - [`EventSource`] / [`Subscription`]: lifecycle event stream with bounded receive
//! - [`WorkerRuntime`] / [`Worker`] / [`Consumer`]: worker factory and handles
//! - [`Lifecycle`]: explicit `init`/`ready` hook registry with deregistration tokens
//!
//! [`App`] bundles an event source and a worker runtime, which is what
//! [`start_monitored_worker`](crate::start_monitored_worker) takes.

mod lifecycle;
mod source;
mod worker;

pub use lifecycle::{HookToken, Lifecycle, WorkerReady};
pub use source::{EventSource, Subscription};
pub use worker::{
    BoxWorkerFuture, Consumer, ConsumerRef, Worker, WorkerOptions, WorkerRef, WorkerRuntime,
};

/// An application the monitor can supervise: emits events and runs workers.
pub trait App: EventSource + WorkerRuntime {}

impl<T: EventSource + WorkerRuntime> App for T {}
