//! Cache Statistics Module
//!
//! Tracks hits per tier, write outcomes and sync daemon progress.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads answered by the memory tier
    pub memory_hits: u64,
    /// Reads answered by the persistent fallback
    pub persistent_hits: u64,
    /// Reads answered by neither tier
    pub misses: u64,
    /// Successful writes
    pub writes: u64,
    /// Writes rejected by the memory tier
    pub write_failures: u64,
    /// Completed sync daemon passes
    pub sync_passes: u64,
    /// Entries copied to the persistent tier
    pub items_persisted: u64,
    /// Failed persistent tier writes during sync
    pub sync_failures: u64,
    /// Sync table entries dropped because memory no longer held the key
    pub entries_dropped: u64,
    /// Keys currently in the sync table
    pub tracked_keys: usize,
}

impl CacheStats {
    /// hits / (hits + misses) over both tiers, or 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.persistent_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// == Tier Stats ==
/// Live counters shared by the facade and the sync daemon.
#[derive(Debug, Default)]
pub struct TierStats {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    sync_passes: AtomicU64,
    items_persisted: AtomicU64,
    sync_failures: AtomicU64,
    entries_dropped: AtomicU64,
}

impl TierStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistent_hit(&self) {
        self.persistent_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds one sync pass into the totals.
    pub fn record_sync_pass(&self, persisted: u64, failed: u64, dropped: u64) {
        self.sync_passes.fetch_add(1, Ordering::Relaxed);
        self.items_persisted.fetch_add(persisted, Ordering::Relaxed);
        self.sync_failures.fetch_add(failed, Ordering::Relaxed);
        self.entries_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Reads every counter. `tracked_keys` is filled in by the caller.
    pub fn snapshot(&self, tracked_keys: usize) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            sync_passes: self.sync_passes.load(Ordering::Relaxed),
            items_persisted: self.items_persisted.load(Ordering::Relaxed),
            sync_failures: self.sync_failures.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            tracked_keys,
        }
    }
}
