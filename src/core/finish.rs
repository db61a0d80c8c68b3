//! Completion flag for spawned loops.
//!
//! [`FinishGuard`] lives inside the spawned task and raises the flag when dropped,
//! so the flag is set on return *and* on panic. [`Finished`] is the joinable side;
//! any number of callers can wait on it, before or after the task ended.

use std::time::Duration;

use tokio::sync::watch;

/// Raises the flag on drop.
pub(crate) struct FinishGuard(watch::Sender<bool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Waitable side of a [`FinishGuard`].
#[derive(Clone)]
pub(crate) struct Finished(watch::Receiver<bool>);

pub(crate) fn finish_flag() -> (FinishGuard, Finished) {
    let (tx, rx) = watch::channel(false);
    (FinishGuard(tx), Finished(rx))
}

impl Finished {
    pub(crate) fn is_set(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits for the flag; `false` if `timeout` elapsed first.
    pub(crate) async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_forever())
            .await
            .is_ok()
    }

    pub(crate) async fn wait_forever(&self) {
        let mut rx = self.0.clone();
        let _ = rx.wait_for(|done| *done).await;
    }
}
