//! Delivery counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by a [`Logger`](super::Logger) and its worker, or by a
/// collector sender and its posting threads
///
/// # Example
///
/// ```
/// use rust_opslog::LoggerMetrics;
///
/// let metrics = LoggerMetrics::new();
/// metrics.record_delivered(3);
/// metrics.record_dropped(1);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.delivered, 3);
/// assert_eq!(snapshot.drop_rate(), 25.0);
/// ```
#[derive(Debug, Default)]
pub struct LoggerMetrics {
    delivered: AtomicU64,
    dropped: AtomicU64,
    queue_full: AtomicU64,
    blocked: AtomicU64,
    critical_bypassed: AtomicU64,
    batches_posted: AtomicU64,
    batches_failed: AtomicU64,
}

/// Point-in-time copy of [`LoggerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub delivered: u64,
    pub dropped: u64,
    pub queue_full: u64,
    pub blocked: u64,
    /// Critical entries written in place because the queue was full
    pub critical_bypassed: u64,
    pub batches_posted: u64,
    pub batches_failed: u64,
}

impl MetricsSnapshot {
    /// Percentage of entries dropped, 0.0 when nothing was processed
    pub fn drop_rate(&self) -> f64 {
        let total = self.delivered + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f64 * 100.0 / total as f64
        }
    }
}

impl LoggerMetrics {
    pub const fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            queue_full: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            critical_bypassed: AtomicU64::new(0),
            batches_posted: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn record_delivered(&self, entries: u64) {
        self.delivered.fetch_add(entries, Ordering::Relaxed);
    }

    /// Returns the new total of dropped entries
    pub fn record_dropped(&self, entries: u64) -> u64 {
        self.dropped.fetch_add(entries, Ordering::Relaxed) + entries
    }

    pub(crate) fn record_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_critical_bypass(&self) {
        self.critical_bypassed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one posted batch and its events
    pub fn record_batch(&self, events: u64) {
        self.batches_posted.fetch_add(1, Ordering::Relaxed);
        self.record_delivered(events);
    }

    /// Count one batch given up on; its events are dropped
    pub fn record_failed_batch(&self, events: u64) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.record_dropped(events);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            delivered: self.delivered(),
            dropped: self.dropped(),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            critical_bypassed: self.critical_bypassed.load(Ordering::Relaxed),
            batches_posted: self.batches_posted.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_returns_running_total() {
        let metrics = LoggerMetrics::new();
        assert_eq!(metrics.record_dropped(1), 1);
        assert_eq!(metrics.record_dropped(4), 5);
        assert_eq!(metrics.dropped(), 5);
    }

    #[test]
    fn test_batches_count_their_events() {
        let metrics = LoggerMetrics::new();
        metrics.record_batch(10);
        metrics.record_batch(2);
        metrics.record_failed_batch(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_posted, 2);
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.delivered, 12);
        assert_eq!(snapshot.dropped, 3);
    }

    #[test]
    fn test_drop_rate() {
        assert_eq!(MetricsSnapshot::default().drop_rate(), 0.0);

        let metrics = LoggerMetrics::new();
        metrics.record_delivered(90);
        metrics.record_dropped(10);
        let rate = metrics.snapshot().drop_rate();
        assert!((9.9..=10.1).contains(&rate), "drop rate was {rate}");
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = LoggerMetrics::new();
        metrics.record_queue_full();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["queue_full"], 1);
        assert_eq!(json["critical_bypassed"], 0);
    }
}
