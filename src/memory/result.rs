//! # In-process result store.
//!
//! Workers record the outcome of each task id; [`AsyncResult`] lets the sender
//! wait for it. Waiting uses a generation counter on a `watch` channel, so a
//! result stored between the check and the wait is never missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::error::ResultError;

/// Final outcome of a task.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    Success(Value),
    Failure(String),
    Revoked,
}

/// Coarse status of a task id as seen by the result store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Sent but not resolved (queued, scheduled or running).
    Pending,
    Success,
    Failure,
    Revoked,
}

pub(crate) struct ResultStore {
    outcomes: Mutex<HashMap<Arc<str>, TaskOutcome>>,
    generation: watch::Sender<u64>,
}

impl ResultStore {
    pub(crate) fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            outcomes: Mutex::new(HashMap::new()),
            generation,
        }
    }

    pub(crate) fn store(&self, id: Arc<str>, outcome: TaskOutcome) {
        self.lock().insert(id, outcome);
        self.generation.send_modify(|g| *g += 1);
    }

    pub(crate) fn get(&self, id: &str) -> Option<TaskOutcome> {
        self.lock().get(id).cloned()
    }

    pub(crate) async fn wait(&self, id: &str, timeout: Duration) -> Option<TaskOutcome> {
        let mut rx = self.generation.subscribe();
        let until_stored = async {
            loop {
                if let Some(outcome) = self.get(id) {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::time::timeout(timeout, until_stored).await.ok()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Arc<str>, TaskOutcome>> {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the eventual result of a sent task.
#[derive(Clone)]
pub struct AsyncResult {
    id: Arc<str>,
    store: Arc<ResultStore>,
}

impl AsyncResult {
    pub(crate) fn new(id: Arc<str>, store: Arc<ResultStore>) -> Self {
        Self { id, store }
    }

    /// Task id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current status without waiting.
    pub fn status(&self) -> TaskStatus {
        match self.store.get(&self.id) {
            None => TaskStatus::Pending,
            Some(TaskOutcome::Success(_)) => TaskStatus::Success,
            Some(TaskOutcome::Failure(_)) => TaskStatus::Failure,
            Some(TaskOutcome::Revoked) => TaskStatus::Revoked,
        }
    }

    /// True once an outcome is stored.
    pub fn ready(&self) -> bool {
        self.status() != TaskStatus::Pending
    }

    /// Waits up to `timeout` for the task's return value.
    pub async fn get(&self, timeout: Duration) -> Result<Value, ResultError> {
        match self.store.wait(&self.id, timeout).await {
            Some(TaskOutcome::Success(v)) => Ok(v),
            Some(TaskOutcome::Failure(error)) => Err(ResultError::Failed { error }),
            Some(TaskOutcome::Revoked) => Err(ResultError::Revoked),
            None => Err(ResultError::Timeout { timeout }),
        }
    }
}

impl std::fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncResult")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}
