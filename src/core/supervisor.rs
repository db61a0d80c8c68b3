//! # Supervisor: starts a worker under a liveness monitor and tears both down.
//!
//! The [`Supervisor`] wires an [`App`] (event source + worker runtime) to a fresh
//! [`LivenessTracker`]: it subscribes and starts the [`Monitor`] first, then
//! launches the worker, then blocks until the worker reports ready.
//!
//! ## High-level flow
//! ```text
//! Supervisor::start(app)
//!   ├─► lifecycle.on_init(record worker)      ──┐ tokens kept for stop()
//!   ├─► lifecycle.on_ready(record consumers)  ──┘
//!   ├─► Monitor::spawn(app)                   (subscription open → no early event lost)
//!   ├─► app.create_worker(opts)
//!   ├─► entry = worker.run() or worker.start() or Err(NoStartupEntry)
//!   ├─► tokio::spawn(entry)
//!   └─► wait ready ─┬─ ready          → Ok(MonitoredWorker)
//!                   ├─ worker exited  → Err(WorkerExited)     (everything torn down)
//!                   └─ timeout        → Err(ReadinessTimeout) (everything torn down)
//!
//! MonitoredWorker::stop()
//!   ├─► monitor.request_stop() + join       (stop consuming events)
//!   ├─► consumer.stop()   for each recorded consumer
//!   ├─► worker.terminate() for each recorded worker (exactly once)
//!   └─► lifecycle.unregister(tokens)
//! ```
//!
//! ## States
//! `NotStarted → Starting (init seen) → Ready (ready seen) → Stopping → Stopped`
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use taskpulse::{Config, MemoryBroker, start_monitored_worker};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Arc::new(MemoryBroker::new(&Config::default()));
//!     broker.register("add", |args| async move {
//!         Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
//!     });
//!
//!     let worker = start_monitored_worker(broker.clone(), Config::default(), 2).await?;
//!
//!     let res = broker.send("add", json!([2, 3]));
//!     assert!(worker.wait_idle(Duration::from_secs(5)).await);
//!     assert_eq!(res.get(Duration::from_secs(1)).await?, json!(5));
//!
//!     worker.stop().await;
//!     assert!(worker.join(Duration::from_secs(5)).await);
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{Config, setup_worker};
use crate::core::finish::{Finished, finish_flag};
use crate::core::liveness::{Liveness, LivenessTracker};
use crate::core::monitor::Monitor;
use crate::error::{MonitorError, SupervisorError, WorkerError};
use crate::runtime::{
    App, ConsumerRef, HookToken, WorkerOptions, WorkerRef, WorkerRuntime,
};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Lifecycle phase of a supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
}

/// Handles collected from lifecycle notifications, plus the phase.
struct Tracked {
    state: SupervisorState,
    workers: Vec<WorkerRef>,
    consumers: Vec<ConsumerRef>,
}

struct Shared {
    tracked: Mutex<Tracked>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SupervisorState {
        self.lock().state
    }

    /// Moves forward only; a late notification never rewinds `Stopping`/`Stopped`.
    fn advance(&self, next: SupervisorState) {
        let mut t = self.lock();
        if rank(next) > rank(t.state) {
            debug!(from = ?t.state, to = ?next, "supervisor state");
            t.state = next;
        }
    }

    fn record_worker(&self, worker: &WorkerRef) {
        let mut t = self.lock();
        if !t.workers.iter().any(|w| Arc::ptr_eq(w, worker)) {
            t.workers.push(worker.clone());
        }
    }
}

fn rank(s: SupervisorState) -> u8 {
    match s {
        SupervisorState::NotStarted => 0,
        SupervisorState::Starting => 1,
        SupervisorState::Ready => 2,
        SupervisorState::Stopping => 3,
        SupervisorState::Stopped => 4,
    }
}

/// Starts workers under a liveness monitor.
///
/// One supervisor starts at most one worker; create a new one per run.
pub struct Supervisor {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    shared: Arc<Shared>,
    launched: AtomicBool,
}

impl Supervisor {
    /// Creates a supervisor with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            shared: Arc::new(Shared {
                tracked: Mutex::new(Tracked {
                    state: SupervisorState::NotStarted,
                    workers: Vec::new(),
                    consumers: Vec::new(),
                }),
            }),
            launched: AtomicBool::new(false),
        }
    }

    /// Sets event observers; they receive every event after the tracker applied it.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Current phase.
    pub fn state(&self) -> SupervisorState {
        self.shared.state()
    }

    /// Starts the monitor and the worker, and waits until the worker is ready.
    ///
    /// Everything started here is torn down again if this returns an error or
    /// the returned future is dropped before it completes.
    pub async fn start<A: App>(&self, app: Arc<A>) -> Result<MonitoredWorker, SupervisorError> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyStarted);
        }
        let runtime: Arc<dyn WorkerRuntime> = app.clone();
        let (hooks, mut ready_rx) = self.register_hooks(runtime.as_ref());
        let mut stage = Teardown {
            runtime: runtime.clone(),
            hooks,
            shared: self.shared.clone(),
            monitor: None,
            created: None,
            armed: true,
        };

        let tracker = Arc::new(LivenessTracker::new());
        let observers = SubscriberSet::new(self.subscribers.clone());
        let monitor = match Monitor::spawn(app.as_ref(), tracker.clone(), &self.cfg, observers).await {
            Ok(m) => Arc::new(m),
            Err(e) => {
                stage.run(&self.cfg).await;
                return Err(SupervisorError::Subscribe {
                    error: e.to_string(),
                });
            }
        };
        stage.monitor = Some(monitor.clone());

        let worker = match runtime.create_worker(WorkerOptions::from(&self.cfg)) {
            Ok(w) => w,
            Err(e) => {
                stage.run(&self.cfg).await;
                return Err(SupervisorError::CreateWorker {
                    error: e.to_string(),
                });
            }
        };
        stage.created = Some(worker.clone());

        let (entry, fut) = match worker.run().map(|f| ("run", f)).or_else(|| {
            worker.start().map(|f| ("start", f))
        }) {
            Some(found) => found,
            None => {
                let name = worker.name().to_string();
                stage.run(&self.cfg).await;
                return Err(SupervisorError::NoStartupEntry { worker: name });
            }
        };
        info!(worker = worker.name(), entry, "launching worker");

        let (guard, worker_done) = finish_flag();
        let worker_result: Arc<Mutex<Option<Result<(), WorkerError>>>> = Arc::new(Mutex::new(None));
        {
            let slot = worker_result.clone();
            tokio::spawn(async move {
                let _guard = guard;
                let res = fut.await;
                if let Err(e) = &res {
                    warn!(error = %e, "worker exited with error");
                }
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(res);
            });
        }

        let startup = self.cfg.startup_timeout;
        let outcome = tokio::select! {
            biased;
            ready = wait_ready(&mut ready_rx, startup) => {
                if ready { Ok(()) } else { Err(SupervisorError::ReadinessTimeout { timeout: startup }) }
            }
            _ = worker_done.wait_forever() => {
                let error = match worker_result.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    Some(Err(e)) => e.to_string(),
                    Some(Ok(())) => "entry point returned".to_string(),
                    None => "worker task panicked".to_string(),
                };
                Err(SupervisorError::WorkerExited { error })
            }
        };

        if let Err(e) = outcome {
            warn!(error = %e, label = e.as_label(), "worker failed to start");
            stage.run(&self.cfg).await;
            return Err(e);
        }

        info!(worker = worker.name(), "worker ready");
        stage.armed = false;
        Ok(MonitoredWorker {
            cfg: self.cfg.clone(),
            tracker,
            monitor,
            runtime,
            hooks: Mutex::new(std::mem::take(&mut stage.hooks)),
            shared: self.shared.clone(),
            worker_done,
            worker_result,
            stopped: AtomicBool::new(false),
        })
    }

    /// Installs the `init`/`ready` hooks. The receiver flips to `true` on `ready`.
    fn register_hooks(&self, runtime: &dyn WorkerRuntime) -> (Vec<HookToken>, watch::Receiver<bool>) {
        let (ready_tx, ready_rx) = watch::channel(false);
        let lifecycle = runtime.lifecycle();

        let shared = self.shared.clone();
        let init = lifecycle.on_init(move |worker| {
            debug!(worker = worker.name(), "worker init");
            shared.record_worker(worker);
            shared.advance(SupervisorState::Starting);
        });

        let shared = self.shared.clone();
        let ready = lifecycle.on_ready(move |ready| {
            debug!(worker = %ready.worker, consumers = ready.consumers.len(), "worker ready");
            shared.lock().consumers.extend(ready.consumers.iter().cloned());
            shared.advance(SupervisorState::Ready);
            ready_tx.send_replace(true);
        });

        (vec![init, ready], ready_rx)
    }
}

async fn wait_ready(rx: &mut watch::Receiver<bool>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, rx.wait_for(|r| *r)).await {
        Ok(res) => res.is_ok(),
        Err(_) => false,
    }
}

/// Undo for a partially started supervisor.
///
/// Runs on the error paths of [`Supervisor::start`], and from `Drop` when the
/// start future is cancelled while still `armed`.
struct Teardown {
    runtime: Arc<dyn WorkerRuntime>,
    hooks: Vec<HookToken>,
    shared: Arc<Shared>,
    monitor: Option<Arc<Monitor>>,
    created: Option<WorkerRef>,
    armed: bool,
}

impl Teardown {
    async fn run(&mut self, cfg: &Config) {
        if let Some(created) = self.created.take() {
            self.shared.record_worker(&created);
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.request_stop();
            if !monitor.join(cfg.join_timeout).await {
                warn!("monitor did not exit during failed start");
            }
        }
        halt(&self.shared, self.runtime.as_ref(), &mut self.hooks);
        self.armed = false;
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("start cancelled; tearing down");
        if let Some(created) = self.created.take() {
            self.shared.record_worker(&created);
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.request_stop();
        }
        halt(&self.shared, self.runtime.as_ref(), &mut self.hooks);
    }
}

/// Stops consumers, terminates workers, unregisters hooks. Each handle is used once.
fn halt(shared: &Shared, runtime: &dyn WorkerRuntime, hooks: &mut Vec<HookToken>) {
    shared.advance(SupervisorState::Stopping);
    let (consumers, workers) = {
        let mut t = shared.lock();
        (
            std::mem::take(&mut t.consumers),
            std::mem::take(&mut t.workers),
        )
    };
    for consumer in consumers {
        consumer.stop();
    }
    for worker in workers {
        debug!(worker = worker.name(), "terminating worker");
        worker.terminate();
    }
    let lifecycle = runtime.lifecycle();
    for token in hooks.drain(..) {
        lifecycle.unregister(token);
    }
    shared.advance(SupervisorState::Stopped);
}

/// Handle to a running, monitored worker.
///
/// Dropping the handle without [`MonitoredWorker::stop`] still stops the monitor and
/// terminates the worker, without waiting for either.
pub struct MonitoredWorker {
    cfg: Config,
    tracker: Arc<LivenessTracker>,
    monitor: Arc<Monitor>,
    runtime: Arc<dyn WorkerRuntime>,
    hooks: Mutex<Vec<HookToken>>,
    shared: Arc<Shared>,
    worker_done: Finished,
    worker_result: Arc<Mutex<Option<Result<(), WorkerError>>>>,
    stopped: AtomicBool,
}

impl MonitoredWorker {
    /// The tracker fed by this worker's events.
    pub fn tracker(&self) -> &Arc<LivenessTracker> {
        &self.tracker
    }

    /// Current idle/active level.
    pub fn liveness(&self) -> Liveness {
        self.tracker.liveness()
    }

    /// True while at least one task is in flight.
    pub fn is_active(&self) -> bool {
        self.tracker.is_active()
    }

    /// Waits until a task is in flight; `false` on timeout.
    pub async fn wait_active(&self, timeout: Duration) -> bool {
        self.tracker.wait_active(timeout).await
    }

    /// Waits until no task is in flight; `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.tracker.wait_idle(timeout).await
    }

    /// Current phase.
    pub fn state(&self) -> SupervisorState {
        self.shared.state()
    }

    /// The transport failure that stopped the monitor, if any.
    pub fn last_error(&self) -> Option<MonitorError> {
        self.monitor.last_error()
    }

    /// The error the worker's entry point returned, if it returned one.
    pub fn worker_error(&self) -> Option<WorkerError> {
        match self
            .worker_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Halts the monitor, stops consumers, terminates the worker, unregisters hooks.
    ///
    /// Idempotent. Waits up to `join_timeout` for the monitor to exit before touching the worker.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("stopping monitored worker");
        self.shared.advance(SupervisorState::Stopping);

        self.monitor.request_stop();
        if !self.monitor.join(self.cfg.join_timeout).await {
            warn!(timeout = ?self.cfg.join_timeout, "monitor did not exit in time");
        }
        self.halt();
    }

    /// Waits until both the monitor and the worker task have exited.
    /// Returns `false` if `timeout` elapsed first.
    pub async fn join(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            self.monitor.join(timeout).await;
            self.worker_done.wait_forever().await;
        })
        .await
        .is_ok()
    }

    /// [`MonitoredWorker::stop`] then [`MonitoredWorker::join`] with the configured timeout.
    pub async fn stop_and_join(&self) -> bool {
        self.stop().await;
        self.join(self.cfg.join_timeout).await
    }

    fn halt(&self) {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        halt(&self.shared, self.runtime.as_ref(), &mut hooks);
    }
}

impl Drop for MonitoredWorker {
    fn drop(&mut self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.monitor.request_stop();
            self.halt();
        }
    }
}

/// Configures, starts and waits for a monitored worker.
///
/// Shorthand for `Supervisor::new(setup_worker(cfg, concurrency)).start(app)`.
pub async fn start_monitored_worker<A: App>(
    app: Arc<A>,
    cfg: Config,
    concurrency: usize,
) -> Result<MonitoredWorker, SupervisorError> {
    Supervisor::new(setup_worker(cfg, concurrency))
        .start(app)
        .await
}
