//! Certificate cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hit_count: u64,

    /// Lookups that found no live entry.
    pub miss_count: u64,

    /// Fetch-and-parse attempts (successful or not).
    pub load_count: u64,

    /// Load attempts that failed.
    pub load_failure_count: u64,

    /// Entries removed because they expired or the cache was full.
    pub eviction_count: u64,
}

impl CacheStats {
    pub fn request_count(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Fraction of lookups served from cache; 1.0 when there were no lookups.
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 1.0,
            n => self.hit_count as f64 / n as f64,
        }
    }

    /// Per-counter difference `self - baseline`, saturating at zero.
    ///
    /// Take a snapshot before a test case and subtract it afterwards to see
    /// only that case's activity on a shared store.
    pub fn minus(&self, baseline: &CacheStats) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.saturating_sub(baseline.hit_count),
            miss_count: self.miss_count.saturating_sub(baseline.miss_count),
            load_count: self.load_count.saturating_sub(baseline.load_count),
            load_failure_count: self
                .load_failure_count
                .saturating_sub(baseline.load_failure_count),
            eviction_count: self.eviction_count.saturating_sub(baseline.eviction_count),
        }
    }
}

/// Live counters. Only ever incremented.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self, success: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_evictions(&self, n: u64) {
        if n > 0 {
            self.evictions.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            load_count: self.loads.load(Ordering::Relaxed),
            load_failure_count: self.load_failures.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
        }
    }
}
