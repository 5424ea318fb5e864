//! Heartbeat Monitor
//!
//! A connection is alive as long as something arrives within the context's
//! heartbeat timeout. The engine checks this at the end of every step.

use std::time::Duration;
use tokio::time::Instant;

/// Tracks the last successful read of one connection.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    last_read: Instant,
}

impl HeartbeatMonitor {
    /// Starts the silence window at `now`.
    pub fn new(now: Instant) -> Self {
        Self { last_read: now }
    }

    pub fn record_read(&mut self, now: Instant) {
        self.last_read = now;
    }

    pub fn last_read(&self) -> Instant {
        self.last_read
    }

    /// See [`heartbeat_expired`].
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        heartbeat_expired(now, self.last_read, timeout)
    }
}

/// True when `timeout` is non-zero and `now` lies strictly past
/// `last_read + timeout`. A deadline beyond the clock's range never expires.
pub fn heartbeat_expired(now: Instant, last_read: Instant, timeout: Duration) -> bool {
    !timeout.is_zero()
        && last_read
            .checked_add(timeout)
            .is_some_and(|deadline| now > deadline)
}
