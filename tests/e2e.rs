//! End-to-end scenarios: a real in-memory worker started under the monitor.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use taskpulse::{
    Config, MemoryBroker, MonitorError, ResultError, SendOptions, Subscribe, Supervisor,
    SupervisorState, TaskError, TaskEvent, TaskEventKind, TaskState, start_monitored_worker,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn cfg() -> Config {
    Config {
        receive_timeout: Duration::from_millis(50),
        startup_timeout: Duration::from_secs(5),
        join_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

fn broker(cfg: &Config) -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::new(cfg));
    broker.register("sleep", |args: Value| async move {
        let ms = args["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!(ms))
    });
    broker.register("add", |args: Value| async move {
        let a = args[0].as_i64().ok_or_else(|| TaskError::fail("a is not a number"))?;
        let b = args[1].as_i64().ok_or_else(|| TaskError::fail("b is not a number"))?;
        Ok(json!(a + b))
    });
    broker
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_task_goes_active_then_idle() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let worker = start_monitored_worker(broker.clone(), cfg, 1).await.unwrap();
    assert_eq!(worker.state(), SupervisorState::Ready);
    assert!(!worker.is_active());

    let res = broker.send("sleep", json!({"ms": 300}));
    assert!(worker.wait_active(Duration::from_millis(50)).await);
    assert!(worker.wait_idle(Duration::from_secs(2)).await);
    assert_eq!(res.get(Duration::from_secs(1)).await, Ok(json!(300)));

    let record = worker.tracker().record(res.id()).unwrap();
    assert_eq!(record.state, TaskState::Succeeded);

    assert!(worker.stop_and_join().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_tasks_cycle_on_one_worker() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let worker = start_monitored_worker(broker.clone(), cfg, 1).await.unwrap();

    for round in 0..5u64 {
        let ms = 50 + round * 10;
        let res = broker.send("sleep", json!({ "ms": ms }));
        assert!(worker.wait_active(Duration::from_millis(50)).await, "round {round}: never active");
        assert!(worker.wait_idle(Duration::from_secs(2)).await, "round {round}: never idle");
        assert_eq!(res.get(Duration::from_secs(1)).await, Ok(json!(ms)));
        assert!(!worker.is_active());
    }

    assert_eq!(worker.tracker().snapshot().transitions, 10);
    assert_eq!(worker.tracker().snapshot().tracked, 5);
    assert!(worker.stop_and_join().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_tasks_finish_in_about_one_delay() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let worker = start_monitored_worker(broker.clone(), cfg, 4).await.unwrap();

    let began = Instant::now();
    let results: Vec<_> = (0..4)
        .map(|_| broker.send("sleep", json!({"ms": 100})))
        .collect();
    assert!(worker.wait_active(Duration::from_secs(1)).await);
    assert!(worker.wait_idle(Duration::from_secs(2)).await);
    let elapsed = began.elapsed();

    assert!(elapsed >= Duration::from_millis(90), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "ran serially: {elapsed:?}");
    for r in results {
        assert_eq!(r.get(Duration::from_secs(1)).await, Ok(json!(100)));
    }

    // One rise and one fall, no flapping in between.
    assert_eq!(worker.tracker().snapshot().transitions, 2);
    assert!(worker.stop_and_join().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scheduled_task_counts_only_once_due() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let worker = start_monitored_worker(broker.clone(), cfg, 1).await.unwrap();

    let sent = Instant::now();
    let res = broker.send_with(
        "sleep",
        json!({"ms": 50}),
        SendOptions::countdown(Duration::from_millis(100)),
    );
    assert!(!worker.is_active());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!worker.is_active());
    let record = worker.tracker().record(res.id()).unwrap();
    assert_eq!(record.state, TaskState::Received);
    assert!(record.scheduled_at.is_some());

    assert!(worker.wait_active(Duration::from_secs(1)).await);
    assert!(sent.elapsed() >= Duration::from_millis(80));
    assert!(worker.wait_idle(Duration::from_secs(1)).await);
    assert_eq!(res.get(Duration::from_secs(1)).await, Ok(json!(50)));

    assert!(worker.stop_and_join().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_and_revoked_tasks_resolve() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let worker = start_monitored_worker(broker.clone(), cfg, 2).await.unwrap();

    let bad = broker.send("add", json!(["x", 1]));
    let later = broker.send_with(
        "add",
        json!([1, 1]),
        SendOptions::countdown(Duration::from_millis(200)),
    );
    broker.revoke(later.id());

    assert!(matches!(
        bad.get(Duration::from_secs(2)).await,
        Err(ResultError::Failed { .. })
    ));
    assert_eq!(later.get(Duration::from_secs(2)).await, Err(ResultError::Revoked));
    assert!(
        eventually(|| {
            worker.tracker().record(later.id()).map(|r| r.state) == Some(TaskState::Revoked)
        })
        .await
    );
    assert!(worker.wait_idle(Duration::from_secs(1)).await);

    assert!(worker.stop_and_join().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_is_idempotent_and_final() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let worker = start_monitored_worker(broker.clone(), cfg, 1).await.unwrap();

    worker.stop().await;
    worker.stop().await;
    assert!(worker.join(Duration::from_secs(2)).await);
    assert!(worker.join(Duration::from_millis(10)).await);
    assert_eq!(worker.state(), SupervisorState::Stopped);
    assert!(worker.last_error().is_none());

    // Nothing consumes the queue any more.
    let res = broker.send("add", json!([1, 2]));
    assert_eq!(
        res.get(Duration::from_millis(200)).await,
        Err(ResultError::Timeout {
            timeout: Duration::from_millis(200)
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lost_connection_stops_the_monitor() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let worker = start_monitored_worker(broker.clone(), cfg, 1).await.unwrap();

    broker.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        worker.last_error(),
        Some(MonitorError::Transport {
            error: "broker closed".into()
        })
    );

    assert!(worker.stop_and_join().await);
    assert_eq!(worker.state(), SupervisorState::Stopped);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<TaskEvent>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &TaskEvent) {
        self.events.lock().unwrap().push(ev.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn observers_see_every_task_event() {
    init_tracing();
    let cfg = cfg();
    let broker = broker(&cfg);
    let recorder = Arc::new(Recorder::default());
    let worker = Supervisor::new(cfg)
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .start(broker.clone())
        .await
        .unwrap();

    let res = broker.send("add", json!([2, 3]));
    assert_eq!(res.get(Duration::from_secs(2)).await, Ok(json!(5)));
    assert!(worker.wait_idle(Duration::from_secs(1)).await);
    assert!(worker.stop_and_join().await);

    let kinds: Vec<TaskEventKind> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.task.as_deref() == Some(res.id()))
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TaskEventKind::Received,
            TaskEventKind::Started,
            TaskEventKind::Succeeded
        ]
    );
}
