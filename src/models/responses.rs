//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, TierState};
use crate::tasks::SyncReport;

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value, lossily decoded as UTF-8
    pub value: String,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: &[u8]) -> Self {
        Self {
            key: key.into(),
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for the tier clearing endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Success message
    pub message: String,
    /// Which tier was cleared ("memory" or "persistent")
    pub tier: String,
}

impl ClearResponse {
    pub fn new(tier: impl Into<String>) -> Self {
        let tier = tier.into();
        Self {
            message: format!("{} tier cleared", tier),
            tier,
        }
    }
}

/// Response body for POST /sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    /// Persistent tier state when the pass ran
    pub tier_state: TierState,
    /// Outcome of the pass
    #[serde(flatten)]
    pub report: SyncReport,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate over both tiers
    pub hit_rate: f64,
    /// Configured memory tier capacity in bytes
    pub memory_capacity: usize,
    /// Persistent tier lifecycle state
    pub tier_state: TierState,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, memory_capacity: usize, tier_state: TierState) -> Self {
        let hit_rate = stats.hit_rate();
        Self {
            stats,
            hit_rate,
            memory_capacity,
            tier_state,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
