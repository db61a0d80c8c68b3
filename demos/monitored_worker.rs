//! # Monitored Worker Example
//!
//! Starts an in-memory worker under the liveness monitor, submits immediate and
//! scheduled tasks, and waits for the worker to go active and back to idle.
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example monitored_worker
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use taskpulse::{Config, LogWriter, MemoryBroker, SendOptions, Subscribe, Supervisor};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config {
        receive_timeout: Duration::from_millis(100),
        heartbeat_interval: Duration::from_millis(500),
        ..Config::default()
    };
    let broker = Arc::new(MemoryBroker::new(&cfg));
    broker.register("sleep", |args: Value| async move {
        let ms = args["ms"].as_u64().unwrap_or(100);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    });

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let worker = Supervisor::new(cfg.with_concurrency(4))
        .with_subscribers(subs)
        .start(broker.clone())
        .await?;
    println!("worker ready: {:?}", worker.state());

    // Four parallel tasks: the pool is busy for about one task duration.
    let began = Instant::now();
    let batch: Vec<_> = (0..4)
        .map(|_| broker.send("sleep", json!({ "ms": 200 })))
        .collect();
    worker.wait_active(Duration::from_secs(1)).await;
    worker.wait_idle(Duration::from_secs(5)).await;
    println!("batch drained in {:?}", began.elapsed());
    for r in &batch {
        println!("  {} -> {}", r.id(), r.get(Duration::from_secs(1)).await?);
    }

    // A scheduled task does not make the worker active until it is due.
    let later = broker.send_with(
        "sleep",
        json!({ "ms": 100 }),
        SendOptions::countdown(Duration::from_millis(500)),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("scheduled task pending, active = {}", worker.is_active());
    worker.wait_active(Duration::from_secs(2)).await;
    println!("scheduled task due, active = {}", worker.is_active());
    worker.wait_idle(Duration::from_secs(2)).await;
    println!("{} -> {}", later.id(), later.get(Duration::from_secs(1)).await?);

    println!("{:#?}", worker.tracker().snapshot());
    worker.stop_and_join().await;
    println!("stopped: {:?}", worker.state());
    Ok(())
}
