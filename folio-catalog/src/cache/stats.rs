//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from an already-valid snapshot.
    pub hits: u64,
    /// Reads that had to start or join a bulk load.
    pub misses: u64,
    /// Bulk loads started.
    pub loads_started: u64,
    /// Bulk loads that failed.
    pub loads_failed: u64,
    /// Point lookups resolved by the fallback resolver.
    pub fallback_hits: u64,
    /// Point lookups the fallback resolver could not satisfy.
    pub fallback_misses: u64,
    /// Fallback results not merged because a reload or invalidation raced them.
    pub merges_skipped: u64,
    /// Explicit invalidations.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) loads_started: AtomicU64,
    pub(crate) loads_failed: AtomicU64,
    pub(crate) fallback_hits: AtomicU64,
    pub(crate) fallback_misses: AtomicU64,
    pub(crate) merges_skipped: AtomicU64,
    pub(crate) invalidations: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            fallback_misses: self.fallback_misses.load(Ordering::Relaxed),
            merges_skipped: self.merges_skipped.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
