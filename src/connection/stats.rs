//! Throughput Statistics
//!
//! Counts bytes and socket polls for one connection and, at most once per
//! monitor window, hands per-second averages to the context's
//! [`NetworkStatsListener`].
//!
//! The very first report only opens the window and is all zeros; every
//! later report covers the counters accumulated since the previous one.

use crate::connection::NetworkStatsListener;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Per-connection throughput counters.
#[derive(Debug, Clone)]
pub struct StatsMonitor {
    interval: Duration,
    bytes_read: u64,
    bytes_written: u64,
    polls: u64,
    last_report: Option<Instant>,
}

impl StatsMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            bytes_read: 0,
            bytes_written: 0,
            polls: 0,
            last_report: None,
        }
    }

    pub fn record_poll(&mut self) {
        self.polls += 1;
    }

    pub fn record_read(&mut self, bytes: usize) {
        self.bytes_read += bytes as u64;
    }

    pub fn record_written(&mut self, bytes: usize) {
        self.bytes_written += bytes as u64;
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Reports to `listener` if a window has elapsed since the last report.
    ///
    /// Returns whether a new window was started.
    pub fn maybe_report(
        &mut self,
        now: Instant,
        listener: Option<&dyn NetworkStatsListener>,
    ) -> bool {
        if let Some(last) = self.last_report {
            // a window that ends past the clock's range never closes
            match last.checked_add(self.interval) {
                Some(end) if now > end => {}
                _ => return false,
            }
        }

        if let Some(listener) = listener {
            match self.last_report {
                None => listener.on_network_stats(0, 0, 0),
                Some(_) => {
                    let secs = self.interval.as_secs().max(1);
                    let (write_rate, read_rate, poll_rate) = (
                        self.bytes_written / secs,
                        self.bytes_read / secs,
                        self.polls / secs,
                    );
                    trace!(write_rate, read_rate, poll_rate, "Network stats");
                    listener.on_network_stats(write_rate, read_rate, poll_rate);
                    self.bytes_written = 0;
                    self.bytes_read = 0;
                    self.polls = 0;
                }
            }
        }

        self.last_report = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::RecordingStatsListener;

    #[test]
    fn test_first_report_is_zero() {
        let listener = RecordingStatsListener::default();
        let mut stats = StatsMonitor::new(Duration::from_secs(10));
        stats.record_read(500);
        stats.record_poll();

        assert!(stats.maybe_report(Instant::now(), Some(&listener)));

        assert_eq!(listener.reports(), vec![(0, 0, 0)]);
        // the opening report does not reset counters
        assert_eq!(stats.bytes_read(), 500);
        assert_eq!(stats.polls(), 1);
    }

    #[test]
    fn test_second_report_averages_and_resets() {
        let listener = RecordingStatsListener::default();
        let mut stats = StatsMonitor::new(Duration::from_secs(10));
        let start = Instant::now();
        stats.maybe_report(start, Some(&listener));

        stats.record_written(1000);
        stats.record_read(250);
        for _ in 0..40 {
            stats.record_poll();
        }

        assert!(!stats.maybe_report(start + Duration::from_secs(10), Some(&listener)));
        assert!(stats.maybe_report(start + Duration::from_secs(11), Some(&listener)));

        assert_eq!(listener.reports(), vec![(0, 0, 0), (100, 25, 4)]);
        assert_eq!(stats.bytes_written(), 0);
        assert_eq!(stats.bytes_read(), 0);
        assert_eq!(stats.polls(), 0);
    }

    #[test]
    fn test_without_listener_only_window_moves() {
        let mut stats = StatsMonitor::new(Duration::from_secs(10));
        let start = Instant::now();
        stats.record_read(10);

        assert!(stats.maybe_report(start, None));
        assert!(!stats.maybe_report(start + Duration::from_secs(5), None));
        assert!(stats.maybe_report(start + Duration::from_secs(11), None));
        assert_eq!(stats.bytes_read(), 10);
    }

    #[test]
    fn test_huge_interval_reports_once() {
        let listener = RecordingStatsListener::default();
        let mut stats = StatsMonitor::new(Duration::from_secs(u64::MAX));
        let start = Instant::now();

        assert!(stats.maybe_report(start, Some(&listener)));
        assert!(!stats.maybe_report(start + Duration::from_secs(3600), Some(&listener)));

        assert_eq!(listener.reports(), vec![(0, 0, 0)]);
    }

    #[test]
    fn test_sub_second_interval_divides_by_one() {
        let listener = RecordingStatsListener::default();
        let mut stats = StatsMonitor::new(Duration::from_millis(100));
        let start = Instant::now();
        stats.maybe_report(start, Some(&listener));
        stats.record_read(7);

        stats.maybe_report(start + Duration::from_millis(150), Some(&listener));

        assert_eq!(listener.reports()[1], (0, 7, 0));
    }
}
