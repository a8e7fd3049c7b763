//! Cache Statistics Module
//!
//! Tracks cache access metrics: hits, misses, expirations and tag-driven
//! invalidations.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache metrics.
///
/// Hits and misses are recorded by keyed reads; a read that finds a live
/// entry counts as a hit even if the tag check subsequently invalidates it
/// (that removal shows up in `invalidations`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of keyed reads that found a live entry
    pub hits: u64,
    /// Number of keyed reads that found nothing (absent or expired)
    pub misses: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Number of entries removed by tag invalidation (lazy or broadcast)
    pub invalidations: u64,
    /// Current number of entries, tag bookkeeping included
    pub entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stat Counters ==
/// Live atomic counters held by the store; snapshotted into [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

impl StatCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshots the counters together with the current entry count.
    pub(crate) fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries,
        }
    }
}
