//! FIFO message queue shared by every worker of one broker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde_json::Value;
use tokio::sync::Notify;

/// One sent task invocation.
#[derive(Clone, Debug)]
pub(crate) struct Message {
    pub(crate) id: Arc<str>,
    pub(crate) name: Arc<str>,
    pub(crate) args: Value,
    pub(crate) eta: Option<SystemTime>,
}

#[derive(Default)]
pub(crate) struct TaskQueue {
    items: Mutex<VecDeque<Message>>,
    notify: Notify,
}

impl TaskQueue {
    pub(crate) fn push(&self, msg: Message) {
        self.lock().push_back(msg);
        self.notify.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// Waits for the next message. Cancel-safe: a message is only removed when
    /// this future completes.
    pub(crate) async fn pop(&self) -> Message {
        loop {
            let notified = self.notify.notified();
            if let Some(msg) = self.try_pop() {
                return msg;
            }
            notified.await;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn msg(id: &str) -> Message {
        Message {
            id: id.into(),
            name: "t".into(),
            args: Value::Null,
            eta: None,
        }
    }

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let q = TaskQueue::default();
        q.push(msg("a"));
        q.push(msg("b"));
        assert_eq!(q.len(), 2);
        assert_eq!(&*q.pop().await.id, "a");
        assert_eq!(&*q.pop().await.id, "b");
        assert!(q.try_pop().is_none());
    }

    #[tokio::test]
    async fn waiting_pop_wakes_on_push() {
        let q = Arc::new(TaskQueue::default());
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.push(msg("late"));
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*got.id, "late");
    }
}
