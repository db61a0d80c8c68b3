//! # Monitor and worker configuration.
//!
//! Provides [`Config`] centralized settings for a monitored worker.
//!
//! Config is used in three places:
//! 1. **Supervisor**: startup/join timeouts
//! 2. **Monitor**: receive window and batch size
//! 3. **Worker runtime**: concurrency, heartbeat interval, bus capacity
//!
//! ## Sentinel values
//! - `heartbeat_interval = 0s` → no heartbeats
//! - `concurrency = 0` → clamped to 1
//! - `receive_timeout = 0s` → clamped to 1ms (the loop must never spin)

use std::time::Duration;

/// Configuration for a monitored worker.
///
/// ## Field semantics
/// - `receive_timeout`: upper bound on one receive call; also the stop latency of the monitor
/// - `receive_batch`: maximum events returned by one receive
/// - `startup_timeout`: how long `start` waits for the worker to report ready
/// - `join_timeout`: default wait used by `stop_and_join`
/// - `concurrency`: task bodies a worker runs at once
/// - `heartbeat_interval`: worker heartbeat period (`0s` = off)
/// - `bus_capacity`: event ring buffer size of the in-memory transport
#[derive(Clone, Debug)]
pub struct Config {
    /// Bounded receive window of the monitor loop.
    ///
    /// `request_stop` is observed within one window.
    pub receive_timeout: Duration,

    /// Maximum number of events one receive returns.
    pub receive_batch: usize,

    /// Maximum wait for the worker's `ready` notification.
    pub startup_timeout: Duration,

    /// Default wait for the monitor and worker tasks to exit after `stop`.
    pub join_timeout: Duration,

    /// Number of task bodies a worker executes concurrently.
    pub concurrency: usize,

    /// Heartbeat period.
    ///
    /// - `Duration::ZERO` = no heartbeats
    pub heartbeat_interval: Duration,

    /// Capacity of the event bus ring buffer (in-memory transport).
    ///
    /// Minimum value is 1 (enforced by the bus).
    pub bus_capacity: usize,
}

impl Config {
    /// Receive window, clamped to at least 1ms.
    #[inline]
    pub fn receive_window(&self) -> Duration {
        self.receive_timeout.max(Duration::from_millis(1))
    }

    /// Batch size, clamped to at least 1.
    #[inline]
    pub fn receive_batch_clamped(&self) -> usize {
        self.receive_batch.max(1)
    }

    /// Concurrency, clamped to at least 1.
    #[inline]
    pub fn concurrency_clamped(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Returns the heartbeat period as an `Option`.
    ///
    /// - `None` → heartbeats disabled
    #[inline]
    pub fn heartbeat(&self) -> Option<Duration> {
        if self.heartbeat_interval == Duration::ZERO {
            None
        } else {
            Some(self.heartbeat_interval)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a copy with the given concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `receive_timeout = 250ms`
    /// - `receive_batch = 256`
    /// - `startup_timeout = 10s`
    /// - `join_timeout = 10s`
    /// - `concurrency = 1`
    /// - `heartbeat_interval = 2s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(250),
            receive_batch: 256,
            startup_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            concurrency: 1,
            heartbeat_interval: Duration::from_secs(2),
            bus_capacity: 1024,
        }
    }
}

/// Applies a concurrency override on top of `base`, the way a test harness
/// configures the app before starting its worker.
pub fn setup_worker(base: Config, concurrency: usize) -> Config {
    base.with_concurrency(concurrency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_clamped() {
        let cfg = Config {
            receive_timeout: Duration::ZERO,
            receive_batch: 0,
            concurrency: 0,
            heartbeat_interval: Duration::ZERO,
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.receive_window(), Duration::from_millis(1));
        assert_eq!(cfg.receive_batch_clamped(), 1);
        assert_eq!(cfg.concurrency_clamped(), 1);
        assert_eq!(cfg.heartbeat(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn setup_worker_overrides_concurrency() {
        let cfg = setup_worker(Config::default(), 4);
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.receive_timeout, Config::default().receive_timeout);
    }
}
