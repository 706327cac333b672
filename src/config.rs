//! Configuration Module
//!
//! Handles loading cache and server configuration from environment variables.

use std::env;
use std::path::PathBuf;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Memory tier capacity in bytes
    pub memory_capacity: usize,
    /// Largest single entry accepted by the memory tier, in bytes
    pub max_item_size: usize,
    /// Persistent tier directory; None keeps the tier disabled
    pub disk_path: Option<PathBuf>,
    /// Persistent tier capacity in bytes
    pub disk_capacity: u64,
    /// Delay between sync passes in seconds
    pub sync_interval: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMORY_CAPACITY_BYTES` - Memory tier capacity (default: 64 MiB)
    /// - `MAX_ITEM_SIZE_BYTES` - Largest entry (default: 1 MiB)
    /// - `DISK_CACHE_PATH` - Persistent tier directory (default: unset)
    /// - `DISK_CAPACITY_BYTES` - Persistent tier capacity (default: 1 GiB)
    /// - `SYNC_INTERVAL` - Seconds between sync passes (default: 30)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_capacity: parse_var("MEMORY_CAPACITY_BYTES").unwrap_or(defaults.memory_capacity),
            max_item_size: parse_var("MAX_ITEM_SIZE_BYTES").unwrap_or(defaults.max_item_size),
            disk_path: env::var("DISK_CACHE_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            disk_capacity: parse_var("DISK_CAPACITY_BYTES").unwrap_or(defaults.disk_capacity),
            sync_interval: parse_var("SYNC_INTERVAL").unwrap_or(defaults.sync_interval),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_capacity: 64 * 1024 * 1024,
            max_item_size: 1024 * 1024,
            disk_path: None,
            disk_capacity: 1024 * 1024 * 1024,
            sync_interval: 30,
            server_port: 3000,
        }
    }
}
