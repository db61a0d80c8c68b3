//! # LogWriter: one log line per lifecycle event
//!
//! A minimal observer that renders incoming [`TaskEvent`]s through `tracing`
//! (target `taskpulse::events`). Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! [received] task="4b0d…" name="multiply" eta=None
//! [started] task="4b0d…"
//! [succeeded] task="4b0d…"
//! [failed] task="91aa…" reason="execution failed: boom"
//! [heartbeat] worker="memory-worker-1" active=2
//! ```

use async_trait::async_trait;
use tracing::info;

use crate::events::{TaskEvent, TaskEventKind};
use crate::subscribers::Subscribe;

/// Event writer observer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &TaskEvent) {
        let task = e.task.as_deref().unwrap_or("-");
        match e.kind {
            TaskEventKind::Received => {
                info!(target: "taskpulse::events", "[received] task={task:?} name={:?} eta={:?}", e.name, e.scheduled_at);
            }
            TaskEventKind::Started => {
                info!(target: "taskpulse::events", "[started] task={task:?}");
            }
            TaskEventKind::Succeeded => {
                info!(target: "taskpulse::events", "[succeeded] task={task:?}");
            }
            TaskEventKind::Failed => {
                info!(target: "taskpulse::events", "[failed] task={task:?} reason={:?}", e.reason.as_deref().unwrap_or("unknown"));
            }
            TaskEventKind::Revoked => {
                info!(target: "taskpulse::events", "[revoked] task={task:?}");
            }
            TaskEventKind::Heartbeat => {
                info!(target: "taskpulse::events", "[heartbeat] worker={:?} active={:?}", e.hostname.as_deref().unwrap_or("unknown"), e.active);
            }
            TaskEventKind::Other => {}
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
