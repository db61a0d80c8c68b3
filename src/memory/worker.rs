//! # In-process worker.
//!
//! A [`MemoryWorker`] pulls messages from its broker's queue and runs the
//! registered task bodies, publishing the lifecycle events the monitor counts.
//!
//! ## Per-message flow
//! ```text
//! queue.pop()
//!   └─► publish received (with eta)
//!        └─► job task:
//!              sleep until eta (if any)
//!              revoked?  ─► store Revoked, publish revoked
//!              acquire concurrency permit
//!              publish started
//!              run body (panic → failure, unknown name → failure)
//!              store outcome, then publish succeeded / failed
//! ```
//!
//! ## Rules
//! - `run()` emits `init` before consuming and `ready` once the consumer is live.
//! - `terminate()` stops the serve loop and aborts running and scheduled jobs.
//! - After the consumer is stopped, jobs already taken keep running until terminate.
//! - A heartbeat carrying the number of running bodies is published every period.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{TaskError, WorkerError};
use crate::events::{TaskEvent, TaskEventKind};
use crate::memory::broker::BrokerInner;
use crate::memory::queue::Message;
use crate::memory::result::TaskOutcome;
use crate::runtime::{BoxWorkerFuture, Consumer, ConsumerRef, Worker, WorkerOptions, WorkerReady, WorkerRef};
use crate::subscribers::panic_message;

/// Consumer handle handed out in the `ready` notification.
pub struct MemoryConsumer {
    token: CancellationToken,
}

impl Consumer for MemoryConsumer {
    fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!("consumer stopped");
        }
        self.token.cancel();
    }
}

/// Worker executing tasks from a [`MemoryBroker`](crate::MemoryBroker) queue.
pub struct MemoryWorker {
    me: Weak<MemoryWorker>,
    hostname: Arc<str>,
    broker: Arc<BrokerInner>,
    opts: WorkerOptions,
    token: CancellationToken,
    launched: AtomicBool,
    active: Arc<AtomicU32>,
}

impl MemoryWorker {
    pub(crate) fn new(hostname: String, broker: Arc<BrokerInner>, opts: WorkerOptions) -> WorkerRef {
        let worker: Arc<MemoryWorker> = Arc::new_cyclic(|me| MemoryWorker {
            me: me.clone(),
            hostname: hostname.into(),
            broker,
            opts,
            token: CancellationToken::new(),
            launched: AtomicBool::new(false),
            active: Arc::new(AtomicU32::new(0)),
        });
        worker
    }

    async fn serve(self: Arc<Self>) -> Result<(), WorkerError> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::Fail {
                error: format!("worker {} is already running", self.hostname),
            });
        }
        if self.token.is_cancelled() {
            return Ok(());
        }

        let handle: WorkerRef = self.clone();
        self.broker.lifecycle.emit_init(&handle);

        let consumer = Arc::new(MemoryConsumer {
            token: self.token.child_token(),
        });
        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency.max(1)));
        let mut jobs = JoinSet::new();
        if let Some(period) = self.opts.heartbeat {
            jobs.spawn(heartbeat(
                self.broker.clone(),
                self.hostname.clone(),
                self.active.clone(),
                period,
            ));
        }

        let consumers: Vec<ConsumerRef> = vec![consumer.clone()];
        self.broker.lifecycle.emit_ready(&WorkerReady {
            worker: self.hostname.clone(),
            consumers,
        });
        info!(worker = %self.hostname, concurrency = self.opts.concurrency, "worker consuming");

        let mut consuming = true;
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = consumer.token.cancelled(), if consuming => {
                    consuming = false;
                }
                Some(done) = jobs.join_next(), if !jobs.is_empty() => {
                    if let Err(e) = done {
                        if e.is_panic() {
                            warn!(worker = %self.hostname, "job task panicked");
                        }
                    }
                }
                msg = self.broker.queue.pop(), if consuming => self.dispatch(msg, &mut jobs, &semaphore),
            }
        }

        jobs.abort_all();
        while jobs.join_next().await.is_some() {}
        info!(worker = %self.hostname, "worker terminated");
        Ok(())
    }

    fn dispatch(&self, msg: Message, jobs: &mut JoinSet<()>, semaphore: &Arc<Semaphore>) {
        debug!(worker = %self.hostname, task = %msg.name, id = %msg.id, "task received");
        self.broker.publish(
            TaskEvent::new(TaskEventKind::Received)
                .with_task(msg.id.clone())
                .with_name(msg.name.clone())
                .with_eta_opt(msg.eta)
                .with_hostname(self.hostname.clone()),
        );
        let job = Job {
            broker: self.broker.clone(),
            hostname: self.hostname.clone(),
            active: self.active.clone(),
            semaphore: semaphore.clone(),
            msg,
        };
        jobs.spawn(job.run());
    }
}

impl Worker for MemoryWorker {
    fn name(&self) -> &str {
        &self.hostname
    }

    fn run(&self) -> Option<BoxWorkerFuture> {
        let me = self.me.upgrade()?;
        Some(Box::pin(me.serve()))
    }

    fn terminate(&self) {
        if !self.token.is_cancelled() {
            info!(worker = %self.hostname, "terminate requested");
        }
        self.token.cancel();
    }
}

async fn heartbeat(
    broker: Arc<BrokerInner>,
    hostname: Arc<str>,
    active: Arc<AtomicU32>,
    period: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        broker.publish(
            TaskEvent::new(TaskEventKind::Heartbeat)
                .with_hostname(hostname.clone())
                .with_active(active.load(Ordering::SeqCst)),
        );
    }
}

struct Job {
    broker: Arc<BrokerInner>,
    hostname: Arc<str>,
    active: Arc<AtomicU32>,
    semaphore: Arc<Semaphore>,
    msg: Message,
}

impl Job {
    async fn run(self) {
        let Job {
            broker,
            hostname,
            active,
            semaphore,
            msg,
        } = self;

        if let Some(eta) = msg.eta {
            if let Ok(delay) = eta.duration_since(SystemTime::now()) {
                tokio::time::sleep(delay).await;
            }
        }
        if broker.take_revoked(&msg.id) {
            revoke(&broker, &hostname, &msg);
            return;
        }

        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };
        if broker.take_revoked(&msg.id) {
            revoke(&broker, &hostname, &msg);
            return;
        }

        active.fetch_add(1, Ordering::SeqCst);
        broker.publish(
            TaskEvent::new(TaskEventKind::Started)
                .with_task(msg.id.clone())
                .with_name(msg.name.clone())
                .with_hostname(hostname.clone()),
        );

        let outcome = match broker.task(&msg.name) {
            None => Err(TaskError::NotRegistered {
                name: msg.name.to_string(),
            }),
            Some(task) => std::panic::AssertUnwindSafe(task.spawn(msg.args))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(TaskError::fail(panic_message(&*panic)))),
        };
        active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(value) => {
                debug!(task = %msg.name, id = %msg.id, "task succeeded");
                broker.results.store(msg.id.clone(), TaskOutcome::Success(value));
                broker.publish(
                    TaskEvent::new(TaskEventKind::Succeeded)
                        .with_task(msg.id)
                        .with_name(msg.name)
                        .with_hostname(hostname),
                );
            }
            Err(e) => {
                warn!(task = %msg.name, id = %msg.id, error = %e, label = e.as_label(), "task failed");
                let reason = e.to_string();
                broker.results.store(msg.id.clone(), TaskOutcome::Failure(reason.clone()));
                broker.publish(
                    TaskEvent::new(TaskEventKind::Failed)
                        .with_task(msg.id)
                        .with_name(msg.name)
                        .with_reason(reason)
                        .with_hostname(hostname),
                );
            }
        }
    }
}

fn revoke(broker: &BrokerInner, hostname: &Arc<str>, msg: &Message) {
    debug!(task = %msg.name, id = %msg.id, "discarding revoked task");
    broker.results.store(msg.id.clone(), TaskOutcome::Revoked);
    broker.publish(
        TaskEvent::new(TaskEventKind::Revoked)
            .with_task(msg.id.clone())
            .with_name(msg.name.clone())
            .with_hostname(hostname.clone()),
    );
}
