//! # Monitor: bounded-wait receive loop feeding the liveness tracker.
//!
//! The [`Monitor`] owns one [`Subscription`], pulls events with a short receive
//! window and applies each of them to the [`LivenessTracker`] in receive order,
//! then fans them out to observers.
//!
//! ## Loop
//! ```text
//! while !stop_requested {
//!     receive(window, batch)
//!       ├─ Ok(events)       → for ev: tracker.apply(ev); observers.emit(ev)
//!       ├─ Err(Timeout)     → tracker.refresh()          (expected; re-check stop flag)
//!       └─ Err(Transport)   → record last_error, log, exit (no retry)
//! }
//! subscription.close(); observers.shutdown(); finished = true
//! ```
//!
//! ## Rules
//! - `request_stop` is idempotent and never blocks; the loop observes it within one window.
//! - A panic while applying a single event is logged and the loop continues.
//! - `join` may be called any number of times, from any task, before or after exit.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::finish::{Finished, finish_flag};
use crate::core::liveness::LivenessTracker;
use crate::error::{MonitorError, ReceiveError};
use crate::runtime::{EventSource, Subscription};
use crate::subscribers::SubscriberSet;

/// Long-running event receive loop.
pub struct Monitor {
    tracker: Arc<LivenessTracker>,
    token: CancellationToken,
    finished: Finished,
    last_error: Arc<Mutex<Option<MonitorError>>>,
}

impl Monitor {
    /// Subscribes to `source` and starts the loop.
    ///
    /// The subscription is open when this returns, so events emitted afterwards are not missed.
    pub async fn spawn<S: EventSource + ?Sized>(
        source: &S,
        tracker: Arc<LivenessTracker>,
        cfg: &Config,
        observers: SubscriberSet,
    ) -> Result<Self, ReceiveError> {
        let subscription = source.subscribe().await?;
        Ok(Self::start(subscription, tracker, cfg, observers))
    }

    /// Starts the loop on an already-open subscription.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        subscription: Box<dyn Subscription>,
        tracker: Arc<LivenessTracker>,
        cfg: &Config,
        observers: SubscriberSet,
    ) -> Self {
        let token = CancellationToken::new();
        let (guard, finished) = finish_flag();
        let last_error = Arc::new(Mutex::new(None));

        let run = MonitorLoop {
            subscription,
            tracker: tracker.clone(),
            observers,
            token: token.clone(),
            window: cfg.receive_window(),
            batch: cfg.receive_batch_clamped(),
            last_error: last_error.clone(),
        };
        tokio::spawn(async move {
            let _guard = guard;
            run.run().await;
        });

        Self {
            tracker,
            token,
            finished,
            last_error,
        }
    }

    /// Asks the loop to exit. Idempotent; does not wait.
    pub fn request_stop(&self) {
        if !self.token.is_cancelled() {
            debug!("monitor stop requested");
        }
        self.token.cancel();
    }

    /// True once [`Monitor::request_stop`] was called.
    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the loop task has exited. Returns `false` if `timeout` elapsed first.
    pub async fn join(&self, timeout: Duration) -> bool {
        self.finished.wait(timeout).await
    }

    /// [`Monitor::request_stop`] followed by [`Monitor::join`].
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.request_stop();
        self.join(timeout).await
    }

    /// True once the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.finished.is_set()
    }

    /// The transport failure that ended the loop, if any.
    pub fn last_error(&self) -> Option<MonitorError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The tracker this monitor feeds.
    pub fn tracker(&self) -> &Arc<LivenessTracker> {
        &self.tracker
    }
}

struct MonitorLoop {
    subscription: Box<dyn Subscription>,
    tracker: Arc<LivenessTracker>,
    observers: SubscriberSet,
    token: CancellationToken,
    window: Duration,
    batch: usize,
    last_error: Arc<Mutex<Option<MonitorError>>>,
}

impl MonitorLoop {
    async fn run(mut self) {
        info!(window = ?self.window, observers = self.observers.len(), "monitor started");

        while !self.token.is_cancelled() {
            match self.subscription.receive(self.window, self.batch).await {
                Ok(events) => {
                    for ev in &events {
                        let tracker = &self.tracker;
                        let applied = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            tracker.apply(ev)
                        }));
                        if applied.is_err() {
                            warn!(seq = ev.seq, kind = %ev.kind, "failed to apply event; skipped");
                            continue;
                        }
                        self.observers.emit(ev);
                    }
                }
                Err(ReceiveError::Timeout) => self.tracker.refresh(),
                Err(ReceiveError::Transport { error }) => {
                    error!(error = %error, "event source failed; monitor exiting");
                    *self
                        .last_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) =
                        Some(MonitorError::Transport { error });
                    break;
                }
            }
        }

        self.subscription.close().await;
        self.observers.shutdown().await;
        info!(stop_requested = self.token.is_cancelled(), "monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{TaskEvent, TaskEventKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Instant, SystemTime};
    use tokio::sync::mpsc;

    type Batch = Result<Vec<TaskEvent>, ReceiveError>;

    struct Scripted {
        rx: mpsc::UnboundedReceiver<Batch>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Subscription for Scripted {
        async fn receive(&mut self, window: Duration, _limit: usize) -> Batch {
            match tokio::time::timeout(window, self.rx.recv()).await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    tokio::time::sleep(window).await;
                    Err(ReceiveError::Timeout)
                }
                Err(_) => Err(ReceiveError::Timeout),
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn cfg() -> Config {
        Config {
            receive_timeout: Duration::from_millis(20),
            ..Config::default()
        }
    }

    fn scripted() -> (mpsc::UnboundedSender<Batch>, Box<dyn Subscription>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let sub = Scripted {
            rx,
            closed: closed.clone(),
        };
        (tx, Box::new(sub), closed)
    }

    fn ev(kind: TaskEventKind, task: &str) -> TaskEvent {
        TaskEvent::new(kind).with_task(task)
    }

    #[tokio::test]
    async fn applies_events_and_stops_on_request() {
        let (tx, sub, closed) = scripted();
        let tracker = Arc::new(LivenessTracker::new());
        let monitor = Monitor::start(sub, tracker.clone(), &cfg(), SubscriberSet::empty());

        tx.send(Ok(vec![ev(TaskEventKind::Received, "a")])).unwrap();
        assert!(tracker.wait_active(Duration::from_secs(1)).await);

        tx.send(Ok(vec![
            ev(TaskEventKind::Started, "a"),
            ev(TaskEventKind::Succeeded, "a"),
        ]))
        .unwrap();
        assert!(tracker.wait_idle(Duration::from_secs(1)).await);

        let began = Instant::now();
        monitor.request_stop();
        monitor.request_stop();
        assert!(monitor.join(Duration::from_secs(1)).await);
        assert!(began.elapsed() < Duration::from_millis(500));
        assert!(monitor.is_finished());
        assert!(closed.load(Ordering::SeqCst));
        assert!(monitor.last_error().is_none());

        // After exit: still a no-op, still joinable.
        monitor.request_stop();
        assert!(monitor.join(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn transport_failure_ends_the_loop() {
        let (tx, sub, closed) = scripted();
        let tracker = Arc::new(LivenessTracker::new());
        let monitor = Monitor::start(sub, tracker, &cfg(), SubscriberSet::empty());

        tx.send(Err(ReceiveError::transport("connection reset")))
            .unwrap();
        assert!(monitor.join(Duration::from_secs(1)).await);
        assert!(!monitor.is_stop_requested());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(
            monitor.last_error(),
            Some(MonitorError::Transport {
                error: "connection reset".into()
            })
        );
    }

    #[tokio::test]
    async fn timeouts_recount_scheduled_tasks() {
        let (tx, sub, _closed) = scripted();
        let tracker = Arc::new(LivenessTracker::new());
        let monitor = Monitor::start(sub, tracker.clone(), &cfg(), SubscriberSet::empty());

        let eta = SystemTime::now() + Duration::from_millis(60);
        tx.send(Ok(vec![ev(TaskEventKind::Received, "b").with_eta(eta)]))
            .unwrap();
        assert!(!tracker.wait_active(Duration::from_millis(30)).await);
        assert!(tracker.wait_active(Duration::from_secs(1)).await);

        assert!(monitor.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn join_times_out_while_running() {
        let (_tx, sub, _closed) = scripted();
        let monitor = Monitor::start(
            sub,
            Arc::new(LivenessTracker::new()),
            &cfg(),
            SubscriberSet::empty(),
        );
        assert!(!monitor.join(Duration::from_millis(30)).await);
        assert!(!monitor.is_finished());
        assert!(monitor.shutdown(Duration::from_secs(1)).await);
    }
}
