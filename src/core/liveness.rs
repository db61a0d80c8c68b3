//! # Liveness tracker: idle/active level from task lifecycle events.
//!
//! Maintains the record of every task id seen so far and derives whether any
//! task is in flight *now*.
//!
//! ## Architecture
//! ```text
//! Monitor loop ──► LivenessTracker::apply(&TaskEvent)
//!                        │   (one mutex: records + in_flight + level)
//!                        ▼
//!              HashMap<task id, TaskRecord>  ──► recount(now)
//!                                                    │  crosses zero?
//!                                                    ▼
//!                                     watch<Liveness>  Idle ⇄ Active
//!                                                    │
//!                     wait_idle / wait_active / is_active (callers)
//! ```
//!
//! ## Rules
//! - A task is **in flight** when it is `Started`, or `Received` with no
//!   schedule or a schedule that is already due.
//! - The count is recomputed from all records on every counting event, never
//!   incremented/decremented, so duplicate terminal events cannot drive it negative.
//! - The level flips only when the count crosses zero; other events cause no wakeups.
//! - Records only move forward: `Received` → `Started` → terminal. A redelivered
//!   or late event never revives a finished task or rewinds a running one; its
//!   schedule is still merged into the record.
//! - Events for ids never seen as `received` create the record in the event's state.
//! - Heartbeats and other events do not change records; heartbeats are kept for
//!   diagnostics and trigger a recount (future-scheduled tasks may have become due).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::events::{TaskEvent, TaskEventKind};

/// Lifecycle state of one task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Received,
    Started,
    Succeeded,
    Failed,
    Revoked,
}

impl TaskState {
    /// Maps a counting event kind to the state it moves a task into.
    pub fn from_kind(kind: TaskEventKind) -> Option<Self> {
        match kind {
            TaskEventKind::Received => Some(TaskState::Received),
            TaskEventKind::Started => Some(TaskState::Started),
            TaskEventKind::Succeeded => Some(TaskState::Succeeded),
            TaskEventKind::Failed => Some(TaskState::Failed),
            TaskEventKind::Revoked => Some(TaskState::Revoked),
            TaskEventKind::Heartbeat | TaskEventKind::Other => None,
        }
    }

    /// `Received` and `Started` are unresolved; the rest are terminal.
    #[inline]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, TaskState::Received | TaskState::Started)
    }

    /// Precedence used when events repeat or arrive out of order.
    #[inline]
    fn rank(&self) -> u8 {
        match self {
            TaskState::Received => 0,
            TaskState::Started => 1,
            TaskState::Succeeded | TaskState::Failed | TaskState::Revoked => 2,
        }
    }
}

/// What the tracker knows about one task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Current lifecycle state.
    pub state: TaskState,
    /// Scheduled execution time from the `received` event.
    pub scheduled_at: Option<SystemTime>,
}

impl TaskRecord {
    /// True if this task counts as in flight at `now`.
    pub fn in_flight_at(&self, now: SystemTime) -> bool {
        match self.state {
            TaskState::Started => true,
            TaskState::Received => self.scheduled_at.is_none_or(|eta| eta <= now),
            _ => false,
        }
    }
}

/// The two mutually exclusive level signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No task is in flight.
    Idle,
    /// At least one task is in flight.
    Active,
}

/// Last heartbeat seen from a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Worker name, if the event carried one.
    pub hostname: Option<Arc<str>>,
    /// Worker-reported executing tasks.
    pub active: Option<u32>,
    /// Timestamp of the heartbeat event.
    pub at: SystemTime,
}

/// Point-in-time view of the tracker, for diagnostics.
#[derive(Debug, Clone)]
pub struct LivenessSnapshot {
    /// Current level.
    pub liveness: Liveness,
    /// Tasks in flight at the last recount.
    pub in_flight: usize,
    /// Unresolved tasks, including ones scheduled for later.
    pub unresolved: usize,
    /// Unresolved tasks whose schedule is still in the future.
    pub scheduled: usize,
    /// All task ids ever seen.
    pub tracked: usize,
    /// Number of level flips so far.
    pub transitions: u64,
    /// Most recent heartbeat.
    pub last_heartbeat: Option<Heartbeat>,
}

struct State {
    records: HashMap<Arc<str>, TaskRecord>,
    in_flight: usize,
    transitions: u64,
    heartbeat: Option<Heartbeat>,
}

/// Thread-safe idle/active tracker.
///
/// ### Responsibilities
/// - Folds task lifecycle events into per-task records
/// - Recomputes the in-flight count from the full record set
/// - Publishes the idle/active level and lets callers wait on it
///
/// ### Rules
/// - Starts `Idle`
/// - Exactly one of idle/active holds at any instant
/// - Records, count and level change together under one lock
pub struct LivenessTracker {
    state: Mutex<State>,
    level: watch::Sender<Liveness>,
}

impl LivenessTracker {
    /// Creates an idle tracker with no records.
    pub fn new() -> Self {
        let (level, _) = watch::channel(Liveness::Idle);
        Self {
            state: Mutex::new(State {
                records: HashMap::new(),
                in_flight: 0,
                transitions: 0,
                heartbeat: None,
            }),
            level,
        }
    }

    /// Folds one event into the tracker.
    ///
    /// ### State transitions
    /// - `Received` → upsert record as `Received` with the event's schedule
    /// - `Started` → `Started` (counts regardless of schedule)
    /// - `Succeeded` / `Failed` / `Revoked` → terminal (stops counting)
    /// - `Heartbeat` → recorded for diagnostics, recount only
    /// - `Other` → ignored
    ///
    /// A transition that would move a record backwards is dropped: the first
    /// terminal state sticks, and `Received` never replaces `Started`.
    pub fn apply(&self, ev: &TaskEvent) {
        if ev.kind == TaskEventKind::Heartbeat {
            let mut st = self.lock();
            st.heartbeat = Some(Heartbeat {
                hostname: ev.hostname.clone(),
                active: ev.active,
                at: ev.at,
            });
            self.recount(&mut st, SystemTime::now());
            return;
        }
        if !ev.kind.affects_count() {
            return;
        }

        let Some(task) = ev.task.as_ref() else {
            warn!(kind = %ev.kind, seq = ev.seq, "task event without task id ignored");
            return;
        };
        let Some(next) = TaskState::from_kind(ev.kind) else {
            return;
        };
        let scheduled_at = if next == TaskState::Received {
            ev.scheduled_at
        } else {
            None
        };

        let mut st = self.lock();
        let rec = st.records.entry(task.clone()).or_insert_with(|| {
            if next != TaskState::Received {
                debug!(task = %task, kind = %ev.kind, "event for unseen task; tracking it");
            }
            TaskRecord {
                state: next,
                scheduled_at,
            }
        });
        if scheduled_at.is_some() {
            rec.scheduled_at = scheduled_at;
        }
        if next.rank() > rec.state.rank() {
            rec.state = next;
        } else if next != rec.state {
            debug!(task = %task, kind = %ev.kind, state = ?rec.state, "stale event; state kept");
        }
        trace!(task = %task, kind = %ev.kind, "applied");
        self.recount(&mut st, SystemTime::now());
    }

    /// Recounts against the current clock without an event.
    ///
    /// Lets tasks scheduled for later become in flight once they are due.
    pub fn refresh(&self) {
        let mut st = self.lock();
        self.recount(&mut st, SystemTime::now());
    }

    /// Current level.
    pub fn liveness(&self) -> Liveness {
        *self.level.borrow()
    }

    /// True while at least one task is in flight.
    pub fn is_active(&self) -> bool {
        self.liveness() == Liveness::Active
    }

    /// True while no task is in flight.
    pub fn is_idle(&self) -> bool {
        self.liveness() == Liveness::Idle
    }

    /// Tasks in flight at the last recount.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Current record of a task, if it was ever seen.
    pub fn record(&self, task: &str) -> Option<TaskRecord> {
        self.lock().records.get(task).cloned()
    }

    /// Waits until the tracker is idle. Returns `false` if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.wait_for(Liveness::Idle, timeout).await
    }

    /// Waits until the tracker is active. Returns `false` if `timeout` elapsed first.
    pub async fn wait_active(&self, timeout: Duration) -> bool {
        self.wait_for(Liveness::Active, timeout).await
    }

    /// Waits without a timeout until the tracker is idle.
    pub async fn idle(&self) {
        let mut rx = self.level.subscribe();
        let _ = rx.wait_for(|l| *l == Liveness::Idle).await;
    }

    /// Waits without a timeout until the tracker is active.
    pub async fn active(&self) {
        let mut rx = self.level.subscribe();
        let _ = rx.wait_for(|l| *l == Liveness::Active).await;
    }

    /// Returns a diagnostic snapshot.
    pub fn snapshot(&self) -> LivenessSnapshot {
        let now = SystemTime::now();
        let st = self.lock();
        let unresolved = st
            .records
            .values()
            .filter(|r| r.state.is_unresolved())
            .count();
        let scheduled = st
            .records
            .values()
            .filter(|r| r.state == TaskState::Received && !r.in_flight_at(now))
            .count();
        LivenessSnapshot {
            liveness: self.liveness(),
            in_flight: st.in_flight,
            unresolved,
            scheduled,
            tracked: st.records.len(),
            transitions: st.transitions,
            last_heartbeat: st.heartbeat.clone(),
        }
    }

    async fn wait_for(&self, target: Liveness, timeout: Duration) -> bool {
        let mut rx = self.level.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|l| *l == target)).await,
            Ok(Ok(_))
        )
    }

    /// Recomputes `in_flight` and flips the level on a zero crossing.
    fn recount(&self, st: &mut State, now: SystemTime) {
        let in_flight = st.records.values().filter(|r| r.in_flight_at(now)).count();
        st.in_flight = in_flight;

        let flipped = self.level.send_if_modified(|level| match (*level, in_flight > 0) {
            (Liveness::Idle, true) => {
                *level = Liveness::Active;
                true
            }
            (Liveness::Active, false) => {
                *level = Liveness::Idle;
                true
            }
            _ => false,
        });
        if flipped {
            st.transitions += 1;
            debug!(in_flight, level = ?self.liveness(), "liveness changed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: TaskEventKind, task: &str) -> TaskEvent {
        TaskEvent::new(kind).with_task(task)
    }

    #[test]
    fn starts_idle() {
        let t = LivenessTracker::new();
        assert!(t.is_idle());
        assert!(!t.is_active());
        assert_eq!(t.in_flight(), 0);
    }

    #[test]
    fn received_then_succeeded_flips_twice() {
        let t = LivenessTracker::new();
        t.apply(&ev(TaskEventKind::Received, "a"));
        assert!(t.is_active());
        t.apply(&ev(TaskEventKind::Started, "a"));
        assert!(t.is_active());
        t.apply(&ev(TaskEventKind::Succeeded, "a"));
        assert!(t.is_idle());
        assert_eq!(t.snapshot().transitions, 2);
    }

    #[test]
    fn every_terminal_kind_resolves() {
        let t = LivenessTracker::new();
        for (id, end) in [
            ("a", TaskEventKind::Succeeded),
            ("b", TaskEventKind::Failed),
            ("c", TaskEventKind::Revoked),
        ] {
            t.apply(&ev(TaskEventKind::Received, id));
            t.apply(&ev(end, id));
        }
        assert!(t.is_idle());
        assert_eq!(t.snapshot().unresolved, 0);
        assert_eq!(t.snapshot().tracked, 3);
    }

    #[test]
    fn concurrent_tasks_do_not_flap() {
        let t = LivenessTracker::new();
        let ids = ["t1", "t2", "t3", "t4"];
        for id in ids {
            t.apply(&ev(TaskEventKind::Received, id));
        }
        for id in ids {
            t.apply(&ev(TaskEventKind::Started, id));
        }
        for (n, id) in ids.iter().enumerate() {
            assert!(t.is_active(), "still active before resolving task #{n}");
            t.apply(&ev(TaskEventKind::Succeeded, id));
        }
        assert!(t.is_idle());
        assert_eq!(t.snapshot().transitions, 2);
    }

    #[test]
    fn future_eta_does_not_activate_until_started() {
        let t = LivenessTracker::new();
        let eta = SystemTime::now() + Duration::from_secs(60);
        t.apply(&ev(TaskEventKind::Received, "later").with_eta(eta));
        assert!(t.is_idle());
        assert_eq!(t.snapshot().scheduled, 1);
        assert_eq!(t.snapshot().unresolved, 1);

        t.apply(&ev(TaskEventKind::Started, "later"));
        assert!(t.is_active());
        t.apply(&ev(TaskEventKind::Succeeded, "later"));
        assert!(t.is_idle());
    }

    #[test]
    fn past_eta_counts_immediately() {
        let t = LivenessTracker::new();
        let eta = SystemTime::now() - Duration::from_secs(1);
        t.apply(&ev(TaskEventKind::Received, "due").with_eta(eta));
        assert!(t.is_active());
    }

    #[test]
    fn refresh_activates_once_eta_passes() {
        let t = LivenessTracker::new();
        let eta = SystemTime::now() + Duration::from_millis(30);
        t.apply(&ev(TaskEventKind::Received, "soon").with_eta(eta));
        assert!(t.is_idle());

        std::thread::sleep(Duration::from_millis(50));
        t.refresh();
        assert!(t.is_active());
        assert_eq!(t.in_flight(), 1);
    }

    #[test]
    fn started_without_received_is_tracked() {
        let t = LivenessTracker::new();
        t.apply(&ev(TaskEventKind::Started, "orphan"));
        assert!(t.is_active());
        assert_eq!(
            t.record("orphan").map(|r| r.state),
            Some(TaskState::Started)
        );
        t.apply(&ev(TaskEventKind::Succeeded, "orphan"));
        assert!(t.is_idle());
    }

    #[test]
    fn terminal_for_unseen_task_stays_idle() {
        let t = LivenessTracker::new();
        t.apply(&ev(TaskEventKind::Failed, "ghost"));
        assert!(t.is_idle());
        assert_eq!(t.snapshot().transitions, 0);
    }

    #[test]
    fn duplicate_terminal_events_do_not_underflow() {
        let t = LivenessTracker::new();
        t.apply(&ev(TaskEventKind::Received, "a"));
        t.apply(&ev(TaskEventKind::Succeeded, "a"));
        t.apply(&ev(TaskEventKind::Succeeded, "a"));
        t.apply(&ev(TaskEventKind::Received, "b"));
        assert!(t.is_active());
        assert_eq!(t.in_flight(), 1);
    }

    #[test]
    fn redelivered_received_does_not_revive_finished_task() {
        let t = LivenessTracker::new();
        t.apply(&ev(TaskEventKind::Received, "a"));
        t.apply(&ev(TaskEventKind::Started, "a"));
        t.apply(&ev(TaskEventKind::Succeeded, "a"));
        t.apply(&ev(TaskEventKind::Received, "a"));
        assert!(t.is_idle());
        assert_eq!(t.record("a").map(|r| r.state), Some(TaskState::Succeeded));
        assert_eq!(t.snapshot().transitions, 2);
    }

    #[test]
    fn late_started_after_terminal_is_ignored() {
        let t = LivenessTracker::new();
        t.apply(&ev(TaskEventKind::Received, "a"));
        t.apply(&ev(TaskEventKind::Succeeded, "a"));
        t.apply(&ev(TaskEventKind::Started, "a"));
        assert!(t.is_idle());
        assert_eq!(t.record("a").map(|r| r.state), Some(TaskState::Succeeded));
    }

    #[test]
    fn first_terminal_state_sticks() {
        let t = LivenessTracker::new();
        t.apply(&ev(TaskEventKind::Received, "a"));
        t.apply(&ev(TaskEventKind::Failed, "a"));
        t.apply(&ev(TaskEventKind::Revoked, "a"));
        assert_eq!(t.record("a").map(|r| r.state), Some(TaskState::Failed));
    }

    #[test]
    fn duplicate_received_keeps_running_task_counted() {
        let t = LivenessTracker::new();
        let eta = SystemTime::now() + Duration::from_secs(60);
        t.apply(&ev(TaskEventKind::Received, "a").with_eta(eta));
        t.apply(&ev(TaskEventKind::Started, "a"));
        t.apply(&ev(TaskEventKind::Received, "a").with_eta(eta));
        assert!(t.is_active());
        assert_eq!(t.in_flight(), 1);
        let rec = t.record("a").unwrap();
        assert_eq!(rec.state, TaskState::Started);
        assert_eq!(rec.scheduled_at, Some(eta));
    }

    #[test]
    fn late_received_merges_schedule_into_started_record() {
        let t = LivenessTracker::new();
        let eta = SystemTime::now() + Duration::from_secs(60);
        t.apply(&ev(TaskEventKind::Started, "a"));
        t.apply(&ev(TaskEventKind::Received, "a").with_eta(eta));
        let rec = t.record("a").unwrap();
        assert_eq!(rec.state, TaskState::Started);
        assert_eq!(rec.scheduled_at, Some(eta));
        assert!(t.is_active());
    }

    #[test]
    fn heartbeat_is_recorded_but_does_not_count() {
        let t = LivenessTracker::new();
        t.apply(
            &TaskEvent::new(TaskEventKind::Heartbeat)
                .with_hostname("w1")
                .with_active(3),
        );
        assert!(t.is_idle());
        let hb = t.snapshot().last_heartbeat.expect("heartbeat kept");
        assert_eq!(hb.hostname.as_deref(), Some("w1"));
        assert_eq!(hb.active, Some(3));
    }

    #[test]
    fn events_without_task_id_are_ignored() {
        let t = LivenessTracker::new();
        t.apply(&TaskEvent::new(TaskEventKind::Received));
        t.apply(&TaskEvent::new(TaskEventKind::Other).with_task("x"));
        assert!(t.is_idle());
        assert_eq!(t.snapshot().tracked, 0);
    }

    #[tokio::test]
    async fn waits_report_timeout_as_false() {
        let t = LivenessTracker::new();
        assert!(t.wait_idle(Duration::from_millis(1)).await);
        assert!(!t.wait_active(Duration::from_millis(20)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn waiter_wakes_on_flip_from_another_task() {
        let t = Arc::new(LivenessTracker::new());

        let waiter = {
            let t = t.clone();
            tokio::spawn(async move { t.wait_active(Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        t.apply(&ev(TaskEventKind::Received, "a"));
        assert!(waiter.await.unwrap());

        let waiter = {
            let t = t.clone();
            tokio::spawn(async move { t.idle().await })
        };
        t.apply(&ev(TaskEventKind::Succeeded, "a"));
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("idle waiter woke")
            .unwrap();
    }
}
