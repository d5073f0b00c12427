//! Cache Statistics Module
//!
//! Tracks how invocations were served: hits, fills and fill-waits.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Invocations answered from the store on the first read
    pub hits: u64,
    /// Invocations that found no entry on the first read
    pub misses: u64,
    /// Computations run and published
    pub fills: u64,
    /// Fills whose computation produced no value (sentinel stored)
    pub null_fills: u64,
    /// Waiters that saw another owner's fill land
    pub wait_hits: u64,
    /// Waiters that ran out of poll attempts
    pub wait_timeouts: u64,
    /// Post-hit transforms that failed
    pub callback_failures: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by all clones of a cache.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    fills: AtomicU64,
    null_fills: AtomicU64,
    wait_hits: AtomicU64,
    wait_timeouts: AtomicU64,
    callback_failures: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fill(&self, null: bool) {
        self.fills.fetch_add(1, Ordering::Relaxed);
        if null {
            self.null_fills.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_wait_hit(&self) {
        self.wait_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wait_timeout(&self) {
        self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            null_fills: self.null_fills.load(Ordering::Relaxed),
            wait_hits: self.wait_hits.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsRecorder::default().snapshot();
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let recorder = StatsRecorder::default();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_hit();
        recorder.record_miss();
        assert_eq!(recorder.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_record_fill_counts_null_fills() {
        let recorder = StatsRecorder::default();
        recorder.record_fill(false);
        recorder.record_fill(true);

        let stats = recorder.snapshot();
        assert_eq!(stats.fills, 2);
        assert_eq!(stats.null_fills, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let recorder = StatsRecorder::default();
        recorder.record_wait_timeout();
        recorder.record_wait_hit();
        recorder.record_callback_failure();

        let json = serde_json::to_value(recorder.snapshot()).unwrap();
        assert_eq!(json["wait_timeouts"], 1);
        assert_eq!(json["wait_hits"], 1);
        assert_eq!(json["callback_failures"], 1);
    }
}
