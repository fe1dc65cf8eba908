//! Cache Statistics Module
//!
//! Entry counts and per-tier hit counters for the layered cache, and
//! namespace counts for the flat cache.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of the layered cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries in the memory tier
    pub memory_entries: usize,
    /// Entries under the cache prefix in the persisted tier
    pub persisted_entries: usize,
    /// Sum of both tiers
    pub total_entries: usize,
    pub memory_hits: u64,
    pub persisted_hits: u64,
    pub blob_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Returns hits / (hits + misses) across all tiers, or 0.0 without lookups.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.persisted_hits + self.blob_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// == Tier Hit ==
/// Where a layered lookup was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierHit {
    Memory,
    Persisted,
    Blob,
    Miss,
}

// == Tier Counters ==
/// Lock-free counters updated on every layered lookup.
#[derive(Debug, Default)]
pub struct TierCounters {
    memory_hits: AtomicU64,
    persisted_hits: AtomicU64,
    blob_hits: AtomicU64,
    misses: AtomicU64,
}

impl TierCounters {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record ==
    pub fn record(&self, hit: TierHit) {
        let counter = match hit {
            TierHit::Memory => &self.memory_hits,
            TierHit::Persisted => &self.persisted_hits,
            TierHit::Blob => &self.blob_hits,
            TierHit::Miss => &self.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Builds a stats snapshot with the given entry counts.
    pub fn snapshot(&self, memory_entries: usize, persisted_entries: usize) -> CacheStats {
        CacheStats {
            memory_entries,
            persisted_entries,
            total_entries: memory_entries + persisted_entries,
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            persisted_hits: self.persisted_hits.load(Ordering::Relaxed),
            blob_hits: self.blob_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

// == Flat Cache Stats ==
/// Entry counts per flat cache namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlatCacheStats {
    pub users: usize,
    pub courses: usize,
    pub course_list: usize,
    pub total: usize,
}
