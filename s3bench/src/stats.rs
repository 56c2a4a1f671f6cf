//! Shared per-phase statistics.
//!
//! [`PhaseStats`] is updated concurrently by every worker of a phase. All fields are atomics:
//! counters use `fetch_add`, and the latency bounds use `fetch_min`/`fetch_max` on nanoseconds, so
//! no update is ever lost. The minimum starts at `u64::MAX` and the maximum at `0`; both are only
//! reported once a successful operation has been recorded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sketches_ddsketch::DDSketch;

/// Lock-free accumulator for the results of one phase.
#[derive(Debug)]
pub struct PhaseStats {
    successes: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl Default for PhaseStats {
    fn default() -> Self {
        Self {
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }
}

impl PhaseStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful operation that moved `bytes` and took `latency`.
    pub fn record_success(&self, bytes: u64, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);

        self.successes.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.min_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Records a failed operation.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads the current values.
    ///
    /// Call this after all workers have joined to get final results.
    pub fn snapshot(&self) -> StatsSnapshot {
        let successes = self.successes.load(Ordering::Relaxed);
        let (min_latency, max_latency) = if successes == 0 {
            (None, None)
        } else {
            (
                Some(Duration::from_nanos(self.min_nanos.load(Ordering::Relaxed))),
                Some(Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed))),
            )
        };

        StatsSnapshot {
            successes,
            failures: self.failures.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            min_latency,
            max_latency,
        }
    }
}

/// A point-in-time copy of [`PhaseStats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Number of successful operations.
    pub successes: u64,
    /// Number of failed operations.
    pub failures: u64,
    /// Total payload bytes moved by successful operations.
    pub bytes: u64,
    /// Fastest successful operation, `None` without successes.
    pub min_latency: Option<Duration>,
    /// Slowest successful operation, `None` without successes.
    pub max_latency: Option<Duration>,
}

impl StatsSnapshot {
    /// Total number of attempted operations.
    pub fn attempts(&self) -> u64 {
        self.successes + self.failures
    }
}

/// Latency percentiles derived from a [`DDSketch`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencySummary {
    /// Mean latency.
    pub avg: Option<Duration>,
    /// Median latency.
    pub p50: Option<Duration>,
    /// 90th percentile latency.
    pub p90: Option<Duration>,
    /// 99th percentile latency.
    pub p99: Option<Duration>,
}

impl LatencySummary {
    /// Summarizes a sketch of latencies recorded in seconds.
    pub fn from_sketch(sketch: &DDSketch) -> Self {
        let count = sketch.count();
        if count == 0 {
            return Self::default();
        }

        let quantile = |q| {
            sketch
                .quantile(q)
                .ok()
                .flatten()
                .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
        };

        Self {
            avg: sketch
                .sum()
                .map(|sum| Duration::from_secs_f64((sum / count as f64).max(0.0))),
            p50: quantile(0.5),
            p90: quantile(0.9),
            p99: quantile(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn empty_stats_have_no_bounds() {
        let snapshot = PhaseStats::new().snapshot();
        assert_eq!(snapshot, StatsSnapshot::default());
        assert_eq!(snapshot.min_latency, None);
        assert_eq!(snapshot.max_latency, None);
    }

    #[test]
    fn first_sample_sets_both_bounds() {
        let stats = PhaseStats::new();
        stats.record_success(10, Duration::from_millis(7));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.min_latency, Some(Duration::from_millis(7)));
        assert_eq!(snapshot.max_latency, Some(Duration::from_millis(7)));
    }

    #[test]
    fn failures_do_not_touch_bounds() {
        let stats = PhaseStats::new();
        stats.record_failure();
        stats.record_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.successes, 0);
        assert_eq!(snapshot.attempts(), 2);
        assert_eq!(snapshot.min_latency, None);
    }

    #[test]
    fn concurrent_updates_are_exact() {
        let stats = Arc::new(PhaseStats::new());

        let threads: Vec<_> = (0..8u64)
            .map(|thread| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for i in 0..1000u64 {
                        let latency = Duration::from_micros(1 + thread * 1000 + i);
                        stats.record_success(3, latency);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.successes, 8000);
        assert_eq!(snapshot.bytes, 24_000);
        assert_eq!(snapshot.min_latency, Some(Duration::from_micros(1)));
        assert_eq!(snapshot.max_latency, Some(Duration::from_micros(8000)));
    }

    #[test]
    fn summary_of_empty_sketch() {
        assert_eq!(
            LatencySummary::from_sketch(&DDSketch::default()),
            LatencySummary::default()
        );
    }

    #[test]
    fn summary_percentiles_are_ordered() {
        let mut sketch = DDSketch::default();
        for ms in 1..=100 {
            sketch.add(ms as f64 / 1000.0);
        }

        let summary = LatencySummary::from_sketch(&sketch);
        let p50 = summary.p50.unwrap();
        let p90 = summary.p90.unwrap();
        let p99 = summary.p99.unwrap();
        assert!(p50 <= p90 && p90 <= p99);
        assert!(summary.avg.unwrap() > Duration::from_millis(40));
        assert!(p99 <= Duration::from_millis(110));
    }
}
