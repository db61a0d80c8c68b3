//! # Event source seam.
//!
//! [`EventSource`] is what the monitor consumes: something it can subscribe to
//! and pull lifecycle events from with a bounded wait.
//!
//! ## Contract
//! ```text
//! subscribe()                      ─► Box<dyn Subscription>
//! Subscription::receive(window, n) ─► Ok(1..=n events)
//!                                  ─► Err(Timeout)    nothing arrived in `window` (expected)
//!                                  ─► Err(Transport)  connection is gone (fatal to the loop)
//! Subscription::close()            ─► release the connection
//! ```
//!
//! ## Rules
//! - `receive` must return within roughly `window`; this bounds the monitor's stop latency.
//! - Events of one task must be yielded in the order the worker emitted them.
//! - `receive` never returns `Ok` with an empty batch; an empty window is `Timeout`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ReceiveError;
use crate::events::TaskEvent;

/// Producer of worker lifecycle events.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Opens a new subscription. Only events emitted after this returns are guaranteed
    /// to be delivered.
    async fn subscribe(&self) -> Result<Box<dyn Subscription>, ReceiveError>;
}

/// One open connection to an [`EventSource`].
#[async_trait]
pub trait Subscription: Send + 'static {
    /// Waits up to `window` for events and returns at most `limit` of them.
    async fn receive(
        &mut self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<TaskEvent>, ReceiveError>;

    /// Releases the connection. Called once when the monitor loop exits.
    async fn close(&mut self) {}
}
