//! # Event observers for the monitor.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   EventSource ──► Monitor loop ──► LivenessTracker::apply(&ev)   (in order, inline)
//!                         │
//!                         └──► SubscriberSet::emit(&ev) ──► Subscribe::on_event(&ev)
//!                                                     ┌────┴────┬─────────┐
//!                                                     ▼         ▼         ▼
//!                                                 LogWriter  Metrics  Custom ...
//! ```
//!
//! The tracker is not an observer: it must see every event, in order, before
//! anyone else does. Observers are best-effort.

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
pub(crate) use subscriber_set::panic_message;
