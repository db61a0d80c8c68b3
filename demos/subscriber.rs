//! # Custom Subscriber Example
//!
//! Shows how to implement a custom event observer to track task metrics while
//! a monitored worker runs a mixed batch of tasks.
//!
//! The example counts:
//! - Tasks received (and how many were scheduled)
//! - Successful completions
//! - Failures
//!
//! ## Run
//! ```bash
//! cargo run --example subscriber
//! ```

use std::{
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde_json::{Value, json};
use taskpulse::{Config, MemoryBroker, SendOptions, Subscribe, Supervisor, TaskError, TaskEvent, TaskEventKind};

struct MetricsSubscriber {
    received: AtomicU64,
    scheduled: AtomicU64,
    failures: AtomicU64,
    successes: AtomicU64,
}

impl MetricsSubscriber {
    fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            scheduled: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            successes: AtomicU64::new(0),
        }
    }
    fn print_stats(&self) {
        println!();
        println!("Metrics:");
        println!(" ├─► Received:  {}", self.received.load(Ordering::Relaxed));
        println!(" ├─► Scheduled: {}", self.scheduled.load(Ordering::Relaxed));
        println!(" ├─► Failures:  {}", self.failures.load(Ordering::Relaxed));
        println!(" └─► Successes: {}", self.successes.load(Ordering::Relaxed));
    }
}

#[async_trait::async_trait]
impl Subscribe for MetricsSubscriber {
    async fn on_event(&self, ev: &TaskEvent) {
        match ev.kind {
            TaskEventKind::Received => {
                self.received.fetch_add(1, Ordering::Relaxed);
                if ev.scheduled_at.is_some() {
                    self.scheduled.fetch_add(1, Ordering::Relaxed);
                }
            }
            TaskEventKind::Succeeded => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            TaskEventKind::Failed => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
    fn name(&self) -> &'static str {
        "metrics"
    }
    fn queue_capacity(&self) -> usize {
        1024
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::default();
    let broker = Arc::new(MemoryBroker::new(&cfg));
    broker.register("flaky", |args: Value| async move {
        let n = args.as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        if n % 3 == 0 {
            return Err(TaskError::fail(format!("input {n} rejected")));
        }
        Ok(json!(n * 2))
    });

    let metrics = Arc::new(MetricsSubscriber::new());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::clone(&metrics) as Arc<dyn Subscribe>];
    let worker = Supervisor::new(cfg.with_concurrency(3))
        .with_subscribers(subs)
        .start(broker.clone())
        .await?;

    for n in 1..=6 {
        broker.send("flaky", json!(n));
    }
    broker.send_with(
        "flaky",
        json!(7),
        SendOptions::countdown(Duration::from_millis(300)),
    );

    worker.wait_active(Duration::from_secs(5)).await;
    // The scheduled task is not counted until due, so wait past its ETA too.
    tokio::time::sleep(Duration::from_millis(350)).await;
    worker.wait_idle(Duration::from_secs(5)).await;

    worker.stop_and_join().await;
    metrics.print_stats();
    Ok(())
}
