//! Memory Tier Entry Module
//!
//! A stored byte value with optional expiry.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Ram Entry ==
/// A single value held by the memory store.
#[derive(Debug, Clone)]
pub struct RamEntry {
    /// The stored bytes
    pub value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Bytes charged against the store budget (key + value)
    pub charge: usize,
}

impl RamEntry {
    /// Creates an entry for `key`, expiring after `ttl` when given.
    pub fn new(key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64));
        let charge = key.len() + value.len();

        Self {
            value,
            expires_at,
            charge,
        }
    }

    /// An entry is expired once the current time reaches its expiry.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
