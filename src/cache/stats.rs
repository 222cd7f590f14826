//! Cache Statistics Module
//!
//! Tracks disk cache metrics including hits, misses, writes and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks disk cache metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Snapshots served
    pub hits: u64,
    /// Lookups for keys with no readable entry
    pub misses: u64,
    /// Successful commits
    pub writes: u64,
    /// Entries removed to stay under the size limit
    pub evictions: u64,
    /// Readable entries currently on disk
    pub total_entries: usize,
    /// Committed bytes currently on disk
    pub size_bytes: u64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Fraction of lookups that found a readable entry, 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }
}
