//! Worker events: types and broadcast bus.
//!
//! ## Contents
//! - [`TaskEventKind`], [`TaskEvent`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`, used by the in-memory transport
//!
//! ## Quick reference
//! - **Publishers**: `MemoryWorker` (consumer loop, task bodies, heartbeats).
//! - **Consumers**: `Monitor` (through an [`EventSource`](crate::EventSource)
//!   subscription), which updates the `LivenessTracker` and fans out to observers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{TaskEvent, TaskEventKind};
