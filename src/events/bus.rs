//! # Event bus for broadcasting worker events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from the in-memory worker (consumer loop,
//! task bodies, heartbeat ticker).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                   Subscribers (one per monitor):
//!   consumer  ──┐
//!   task body ──┼──────► Bus ───────► MemorySubscription ────► Monitor loop
//!   heartbeat ──┘  (broadcast chan)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)`; the memory
//!   subscription reports that as a transport failure.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use tokio::sync::broadcast;

use super::event::TaskEvent;

/// Broadcast channel for worker events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<TaskEvent>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// The minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<TaskEvent>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: TaskEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TaskEventKind;

    #[tokio::test]
    async fn subscriber_sees_events_published_after_subscribe() {
        let bus = Bus::new(8);
        bus.publish(TaskEvent::new(TaskEventKind::Other));

        let mut rx = bus.subscribe();
        bus.publish(TaskEvent::new(TaskEventKind::Received).with_task("a"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, TaskEventKind::Received);
        assert_eq!(ev.task.as_deref(), Some("a"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        let _rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
    }
}
