//! # Event observer trait.
//!
//! Provides [`Subscribe`] an extension point for plugging custom event handlers
//! into the monitor (logging, metrics, recording for assertions).
//!
//! Each observer gets:
//! - **Dedicated worker task** (runs independently of the monitor loop)
//! - **Per-observer bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged)
//!
//! ## Architecture
//! ```text
//! Monitor ──► tracker.apply(&ev) ──► SubscriberSet::emit(&ev)
//!                                          └─► [bounded queue] ──► worker task ──► observer.on_event()
//! ```
//!
//! ## Rules
//! - Observers see events **after** the tracker applied them.
//! - A slow observer only affects its own queue; overflow drops the event for it alone.
//! - Events are processed sequentially (FIFO) per observer.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use taskpulse::{Subscribe, TaskEvent, TaskEventKind};
//!
//! struct Failures;
//!
//! #[async_trait]
//! impl Subscribe for Failures {
//!     async fn on_event(&self, ev: &TaskEvent) {
//!         if matches!(ev.kind, TaskEventKind::Failed) {
//!             // export a metric, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failures" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::TaskEvent;

/// Observer of task lifecycle events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, not in the monitor loop.
    async fn on_event(&self, event: &TaskEvent);

    /// Returns the observer name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this observer.
    ///
    /// The set clamps capacity to a minimum of 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
