//! # In-process broker: task registry, queue, results and event bus.
//!
//! [`MemoryBroker`] is a complete, single-process stand-in for a message broker
//! plus result backend. It is both an [`EventSource`] (subscriptions read the
//! event [`Bus`]) and a [`WorkerRuntime`] (creates [`MemoryWorker`]s that pull
//! from its queue), so it can be handed straight to
//! [`start_monitored_worker`](crate::start_monitored_worker).
//!
//! ## Architecture
//! ```text
//! send(name, args) ──► TaskQueue ──► MemoryWorker ──► task body
//!        │                               │
//!        └──► AsyncResult ◄── ResultStore ◄┘
//!                                        │ publish
//!                                        ▼
//!              Monitor ◄── MemorySubscription ◄── Bus
//! ```
//!
//! ## Rules
//! - `close()` fails every open subscription with a transport error and refuses new ones.
//! - A subscription that falls behind the bus capacity reports a transport error.
//! - Revoking a task that already finished has no effect.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ReceiveError, TaskError, WorkerError};
use crate::events::{Bus, TaskEvent};
use crate::memory::queue::{Message, TaskQueue};
use crate::memory::result::{AsyncResult, ResultStore};
use crate::memory::task::{TaskFn, TaskRef};
use crate::memory::worker::MemoryWorker;
use crate::runtime::{EventSource, Lifecycle, Subscription, WorkerOptions, WorkerRef, WorkerRuntime};

/// When a sent task may run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Run no earlier than this long after sending.
    pub countdown: Option<Duration>,
    /// Run no earlier than this instant. Takes precedence over `countdown`.
    pub eta: Option<SystemTime>,
}

impl SendOptions {
    /// Delay execution by `delay`.
    pub fn countdown(delay: Duration) -> Self {
        Self {
            countdown: Some(delay),
            eta: None,
        }
    }

    /// Run at `at`.
    pub fn eta(at: SystemTime) -> Self {
        Self {
            countdown: None,
            eta: Some(at),
        }
    }

    fn resolve(&self, now: SystemTime) -> Option<SystemTime> {
        self.eta.or_else(|| self.countdown.map(|d| now + d))
    }
}

/// State shared between the broker handle and its workers.
pub(crate) struct BrokerInner {
    pub(crate) bus: Bus,
    pub(crate) queue: TaskQueue,
    pub(crate) results: Arc<ResultStore>,
    tasks: RwLock<HashMap<String, TaskRef>>,
    revoked: Mutex<HashSet<Arc<str>>>,
    pub(crate) closed: CancellationToken,
    pub(crate) lifecycle: Lifecycle,
}

impl BrokerInner {
    pub(crate) fn task(&self, name: &str) -> Option<TaskRef> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Consumes a pending revocation for `id`.
    pub(crate) fn take_revoked(&self, id: &str) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub(crate) fn publish(&self, ev: TaskEvent) {
        self.bus.publish(ev);
    }
}

/// In-process broker, result backend and worker factory.
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
    workers: AtomicUsize,
}

impl MemoryBroker {
    /// Creates an empty broker. Uses `cfg.bus_capacity` for the event bus.
    pub fn new(cfg: &Config) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                bus: Bus::new(cfg.bus_capacity_clamped()),
                queue: TaskQueue::default(),
                results: Arc::new(ResultStore::new()),
                tasks: RwLock::new(HashMap::new()),
                revoked: Mutex::new(HashSet::new()),
                closed: CancellationToken::new(),
                lifecycle: Lifecycle::new(),
            }),
            workers: AtomicUsize::new(0),
        }
    }

    /// Registers a closure as the body of task `name`. Replaces an earlier registration.
    pub fn register<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        self.register_task(TaskFn::arc(name.to_string(), f));
    }

    /// Registers a task body under its own name.
    pub fn register_task(&self, task: TaskRef) {
        debug!(task = task.name(), "task registered");
        self.inner
            .tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.name().to_string(), task);
    }

    /// Names of all registered tasks, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Queues task `name` for immediate execution.
    pub fn send(&self, name: &str, args: Value) -> AsyncResult {
        self.send_with(name, args, SendOptions::default())
    }

    /// Queues task `name` with scheduling options.
    ///
    /// Sending an unregistered name is not an error here; the worker reports it as
    /// a task failure.
    pub fn send_with(&self, name: &str, args: Value, opts: SendOptions) -> AsyncResult {
        let id: Arc<str> = uuid::Uuid::new_v4().to_string().into();
        let eta = opts.resolve(SystemTime::now());
        debug!(task = name, id = %id, scheduled = eta.is_some(), "task sent");
        self.inner.queue.push(Message {
            id: id.clone(),
            name: name.into(),
            args,
            eta,
        });
        AsyncResult::new(id, self.inner.results.clone())
    }

    /// Handle for a task id sent earlier.
    pub fn result(&self, id: &str) -> AsyncResult {
        AsyncResult::new(id.into(), self.inner.results.clone())
    }

    /// Marks a task id as revoked. A queued or scheduled task with this id is
    /// discarded when a worker reaches it; a running or finished one is unaffected.
    pub fn revoke(&self, id: &str) {
        info!(id, "task revoked");
        self.inner
            .revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    /// Messages waiting to be picked up by a worker.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Simulates a lost connection: open subscriptions fail, new ones are refused.
    pub fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            info!("broker closed");
        }
        self.inner.closed.cancel();
    }

    /// True after [`MemoryBroker::close`].
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

#[async_trait]
impl EventSource for MemoryBroker {
    async fn subscribe(&self) -> Result<Box<dyn Subscription>, ReceiveError> {
        if self.inner.closed.is_cancelled() {
            return Err(ReceiveError::transport("broker closed"));
        }
        Ok(Box::new(MemorySubscription {
            rx: self.inner.bus.subscribe(),
            closed: self.inner.closed.clone(),
            lagged: None,
        }))
    }
}

impl WorkerRuntime for MemoryBroker {
    fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    fn create_worker(&self, opts: WorkerOptions) -> Result<WorkerRef, WorkerError> {
        if self.inner.closed.is_cancelled() {
            return Err(WorkerError::Fail {
                error: "broker closed".into(),
            });
        }
        let n = self.workers.fetch_add(1, Ordering::Relaxed) + 1;
        let hostname = format!("memory-worker-{n}@{}", std::process::id());
        Ok(MemoryWorker::new(hostname, self.inner.clone(), opts))
    }
}

/// A subscription reading the broker's event bus.
struct MemorySubscription {
    rx: broadcast::Receiver<TaskEvent>,
    closed: CancellationToken,
    lagged: Option<u64>,
}

fn lagged(n: u64) -> ReceiveError {
    ReceiveError::transport(format!("event stream lagged; {n} events lost"))
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn receive(
        &mut self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<TaskEvent>, ReceiveError> {
        if let Some(n) = self.lagged.take() {
            return Err(lagged(n));
        }
        let first = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(ReceiveError::transport("broker closed")),
            r = tokio::time::timeout(window, self.rx.recv()) => r,
        };
        let first = match first {
            Err(_) => return Err(ReceiveError::Timeout),
            Ok(Ok(ev)) => ev,
            Ok(Err(RecvError::Lagged(n))) => return Err(lagged(n)),
            Ok(Err(RecvError::Closed)) => return Err(ReceiveError::transport("event bus closed")),
        };

        let mut batch = vec![first];
        while batch.len() < limit.max(1) {
            match self.rx.try_recv() {
                Ok(ev) => batch.push(ev),
                Err(TryRecvError::Lagged(n)) => {
                    self.lagged = Some(n);
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(batch)
    }
}
