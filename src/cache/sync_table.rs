//! Sync Table Module
//!
//! Per-key record of which tiers hold a copy of the value.

use dashmap::DashMap;
use serde::Serialize;

/// Synchronization status of one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Copied to the persistent tier
    pub persisted: bool,
    /// Reserved for the remote tier; always false
    pub remote_synced: bool,
}

// == Sync Table ==
/// Concurrency-safe map from cache key to [`SyncStatus`].
///
/// An entry exists once a key has been written through the facade. It says
/// nothing about whether the memory tier still holds the key.
#[derive(Debug, Default)]
pub struct SyncTable {
    entries: DashMap<String, SyncStatus>,
}

impl SyncTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fresh write: the key is tracked and not yet persisted.
    pub fn reset(&self, key: &str) {
        self.entries.insert(key.to_string(), SyncStatus::default());
    }

    pub fn status(&self, key: &str) -> Option<SyncStatus> {
        self.entries.get(key).map(|entry| *entry)
    }

    pub fn is_persisted(&self, key: &str) -> bool {
        self.status(key).is_some_and(|status| status.persisted)
    }

    /// Flags an existing entry as persisted. Returns false if the key is not
    /// tracked.
    pub fn mark_persisted(&self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.persisted = true;
                true
            }
            None => false,
        }
    }

    /// Clears the persisted flag of an existing entry, keeping the entry.
    pub fn demote(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.persisted = false;
        }
    }

    /// Drops the entry unless it has been persisted in the meantime.
    pub fn remove_unpersisted(&self, key: &str) -> bool {
        self.entries
            .remove_if(key, |_, status| !status.persisted)
            .is_some()
    }

    /// Snapshot of the keys still waiting for the persistent tier.
    pub fn unpersisted_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !entry.value().persisted)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
