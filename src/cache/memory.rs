//! Memory Tier Module
//!
//! The bounded in-process store: a byte budget with LRU eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::cache::{LruTracker, RamEntry};
use crate::error::StoreError;

// == Memory Store Capability ==
/// A bounded, concurrency-safe key to bytes store with its own eviction.
///
/// Eviction is silent: a key that was successfully set may later read as
/// absent without any notification.
pub trait MemoryStore: Send + Sync {
    /// Returns a copy of the value, or `None` if absent or evicted.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores `value`, replacing any prior value for `key`.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Removes `key`, reporting whether it was present.
    fn del(&self, key: &str) -> bool;

    /// Removes every entry.
    fn clear(&self);
}

#[derive(Debug, Default)]
struct RamState {
    entries: HashMap<String, RamEntry>,
    lru: LruTracker,
    used_bytes: usize,
}

impl RamState {
    fn remove(&mut self, key: &str) -> Option<RamEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.used_bytes -= entry.charge;
        Some(entry)
    }
}

// == Ram Store ==
/// Default [`MemoryStore`]: every entry is charged `key.len() + value.len()`
/// bytes against a fixed budget.
#[derive(Debug)]
pub struct RamStore {
    state: Mutex<RamState>,
    budget_bytes: usize,
    max_item_bytes: usize,
    evictions: AtomicU64,
}

impl RamStore {
    /// Creates a store holding at most `budget_bytes`, rejecting any single
    /// entry larger than `max_item_bytes`.
    pub fn new(budget_bytes: usize, max_item_bytes: usize) -> Self {
        Self {
            state: Mutex::new(RamState::default()),
            budget_bytes,
            max_item_bytes: max_item_bytes.min(budget_bytes),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Bytes currently charged against the budget.
    pub fn used_bytes(&self) -> usize {
        self.state.lock().used_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries evicted to make room since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl MemoryStore for RamStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();

        if state.entries.get(key)?.is_expired() {
            state.remove(key);
            return None;
        }

        state.lru.touch(key);
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = RamEntry::new(key, value.to_vec(), ttl);
        if entry.charge > self.max_item_bytes {
            return Err(StoreError::ValueTooLarge {
                size: entry.charge,
                limit: self.max_item_bytes,
            });
        }

        let mut state = self.state.lock();
        state.remove(key);

        while state.used_bytes + entry.charge > self.budget_bytes {
            let Some(oldest) = state.lru.evict_oldest() else {
                break;
            };
            if let Some(evicted) = state.entries.remove(&oldest) {
                state.used_bytes -= evicted.charge;
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        state.used_bytes += entry.charge;
        state.entries.insert(key.to_string(), entry);
        state.lru.touch(key);
        Ok(())
    }

    fn del(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.lru.clear();
        state.used_bytes = 0;
    }
}
