//! Lock-free counters and periodic reporting
//!
//! All atomics use Relaxed ordering: these are statistical counters only and
//! never drive watcher decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Fetch latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤12000, >12000
const FETCH_BUCKET_BOUNDS: [u64; 8] = [50, 100, 250, 500, 1000, 2500, 5000, 12000];
pub const NUM_FETCH_BUCKETS: usize = 9;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    FETCH_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Watcher counters shared by the poll loop and the notification worker
pub struct Metrics {
    cycles: AtomicU64,
    samples: AtomicU64,
    no_data: AtomicU64,
    source_errors: AtomicU64,
    invalid_samples: AtomicU64,
    stale_samples: AtomicU64,
    transitions: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    notifications_dropped: AtomicU64,
    fetch_latency_max_ms: AtomicU64,
    fetch_latency_buckets: [AtomicU64; NUM_FETCH_BUCKETS],
    started_at: Instant,
    last_report_time: Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            cycles: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            no_data: AtomicU64::new(0),
            source_errors: AtomicU64::new(0),
            invalid_samples: AtomicU64::new(0),
            stale_samples: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            fetch_latency_max_ms: AtomicU64::new(0),
            fetch_latency_buckets: Default::default(),
            started_at: now,
            last_report_time: Mutex::new(now),
        }
    }

    #[inline]
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one fetch round-trip against the position source
    #[inline]
    pub fn record_fetch(&self, latency_ms: u64) {
        self.fetch_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.fetch_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_no_data(&self) {
        self.no_data.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_invalid_sample(&self) {
        self.invalid_samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_sample(&self) {
        self.stale_samples.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn notifications_failed(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }

    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot all counters. Totals are monotonic; the latency histogram
    /// and max are reset so each report covers one period.
    pub fn report(&self) -> MetricsSummary {
        let mut fetch_buckets = [0u64; NUM_FETCH_BUCKETS];
        for (i, bucket) in self.fetch_latency_buckets.iter().enumerate() {
            fetch_buckets[i] = bucket.swap(0, Ordering::Relaxed);
        }

        let period_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed.as_secs()
        };

        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            period_secs,
            cycles: self.cycles.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            no_data: self.no_data.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            invalid_samples: self.invalid_samples.load(Ordering::Relaxed),
            stale_samples: self.stale_samples.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            fetch_latency_max_ms: self.fetch_latency_max_ms.swap(0, Ordering::Relaxed),
            fetch_buckets,
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub period_secs: u64,
    pub cycles: u64,
    pub samples: u64,
    pub no_data: u64,
    pub source_errors: u64,
    pub invalid_samples: u64,
    pub stale_samples: u64,
    pub transitions: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub notifications_dropped: u64,
    pub fetch_latency_max_ms: u64,
    /// Bounds: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤12000, >12000 ms
    pub fetch_buckets: [u64; NUM_FETCH_BUCKETS],
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            period_secs = %self.period_secs,
            cycles = %self.cycles,
            samples = %self.samples,
            no_data = %self.no_data,
            source_errors = %self.source_errors,
            invalid = %self.invalid_samples,
            stale = %self.stale_samples,
            transitions = %self.transitions,
            sent = %self.notifications_sent,
            failed = %self.notifications_failed,
            dropped = %self.notifications_dropped,
            fetch_max_ms = %self.fetch_latency_max_ms,
            fetch_buckets = ?self.fetch_buckets,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.cycles(), 0);
        assert_eq!(metrics.transitions(), 0);
        assert_eq!(metrics.notifications_sent(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(12000), 7);
        assert_eq!(bucket_index(60_000), 8);
    }

    #[test]
    fn test_report_resets_latency_only() {
        let metrics = Metrics::new();
        metrics.record_cycle();
        metrics.record_cycle();
        metrics.record_fetch(30);
        metrics.record_fetch(700);
        metrics.record_transition();

        let first = metrics.report();
        assert_eq!(first.cycles, 2);
        assert_eq!(first.transitions, 1);
        assert_eq!(first.fetch_latency_max_ms, 700);
        assert_eq!(first.fetch_buckets[0], 1);
        assert_eq!(first.fetch_buckets[4], 1);

        let second = metrics.report();
        assert_eq!(second.cycles, 2);
        assert_eq!(second.fetch_latency_max_ms, 0);
        assert_eq!(second.fetch_buckets.iter().sum::<u64>(), 0);
    }

    #[test]
    fn test_summary_log_includes_histogram() {
        let (logs, _guard) = crate::infra::logging::capture::capture_info();
        let metrics = Metrics::new();
        metrics.record_cycle();
        metrics.record_sample();
        metrics.record_fetch(30);
        metrics.record_fetch(700);
        metrics.report().log();

        let lines = logs.lines_with("metrics");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("period_secs="), "{}", lines[0]);
        assert!(lines[0].contains("samples=1"), "{}", lines[0]);
        assert!(lines[0].contains("fetch_buckets=[1, 0, 0, 0, 1, 0, 0, 0, 0]"), "{}", lines[0]);
    }
}
