//! Cache Machine Module
//!
//! The facade over both tiers. Writes land in the memory tier and are
//! marked unpersisted; the sync daemon copies them to the persistent tier
//! later. Reads fall back to the persistent tier only for keys the sync
//! table reports as persisted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheStats, DiskStore, MemoryStore, PersistentStore, RamStore, SyncStatus, SyncTable,
    TierStats,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::logger::{Logger, LoggerCell};
use crate::tasks::{run_sync_pass, SyncContext, SyncDaemon, SyncReport, DEFAULT_SYNC_INTERVAL};

/// Smallest budget given to the default memory store.
pub const MIN_MEMORY_BUDGET: usize = 512 * 1024;

/// How long disabling waits for an in-flight sync pass before aborting it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// == Tier State ==
/// Lifecycle of the persistent tier and its sync daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierState {
    Disabled,
    Enabling,
    Running,
    Disabling,
}

struct PersistentTier {
    state: TierState,
    store: Option<Arc<dyn PersistentStore>>,
    daemon: Option<SyncDaemon>,
    path: Option<PathBuf>,
}

impl Default for PersistentTier {
    fn default() -> Self {
        Self {
            state: TierState::Disabled,
            store: None,
            daemon: None,
            path: None,
        }
    }
}

/// Returns the tier to `Disabled` when dropped, unless defused. Held across
/// the awaits of enable and disable so a cancelled call cannot leave the
/// tier in a transient state.
struct SettleGuard<'a> {
    tier: &'a Mutex<PersistentTier>,
    armed: bool,
}

impl<'a> SettleGuard<'a> {
    fn new(tier: &'a Mutex<PersistentTier>) -> Self {
        Self { tier, armed: true }
    }

    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // drop the daemon outside the lock; its Drop aborts the task
        let daemon = {
            let mut tier = self.tier.lock();
            tier.store = None;
            tier.path = None;
            tier.state = TierState::Disabled;
            tier.daemon.take()
        };
        drop(daemon);
    }
}

// == Cache Machine ==
/// Two-tier byte cache.
///
/// Consistency between the tiers is eventual: a `set` racing a sync pass
/// may leave an older value on disk, and memory-tier evictions are only
/// noticed by the next pass.
pub struct CacheMachine {
    memory_capacity: usize,
    max_item_size: usize,
    sync_interval: Duration,
    memory: Arc<dyn MemoryStore>,
    sync_table: Arc<SyncTable>,
    logger: Arc<LoggerCell>,
    stats: Arc<TierStats>,
    tier: Mutex<PersistentTier>,
}

impl CacheMachine {
    // == Constructors ==
    /// Creates a cache whose memory tier is a [`RamStore`].
    ///
    /// Both sizes must be non-zero. Entries larger than
    /// `max_item_size_bytes` are rejected by the memory tier.
    pub fn new(memory_capacity_bytes: usize, max_item_size_bytes: usize) -> Result<Self> {
        validate_sizes(memory_capacity_bytes, max_item_size_bytes)?;

        let budget = memory_capacity_bytes.max(MIN_MEMORY_BUDGET);
        let memory = Arc::new(RamStore::new(budget, max_item_size_bytes));
        Self::with_memory_store(memory_capacity_bytes, max_item_size_bytes, memory)
    }

    /// Creates a cache over an existing memory store. The sizes are
    /// validated and reported but the store enforces its own limits.
    pub fn with_memory_store(
        memory_capacity_bytes: usize,
        max_item_size_bytes: usize,
        memory: Arc<dyn MemoryStore>,
    ) -> Result<Self> {
        validate_sizes(memory_capacity_bytes, max_item_size_bytes)?;

        Ok(Self {
            memory_capacity: memory_capacity_bytes,
            max_item_size: max_item_size_bytes,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            memory,
            sync_table: Arc::new(SyncTable::new()),
            logger: Arc::new(LoggerCell::default()),
            stats: Arc::new(TierStats::new()),
            tier: Mutex::new(PersistentTier::default()),
        })
    }

    /// Creates a cache from loaded configuration. The persistent tier is
    /// not enabled here.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.sync_interval == 0 {
            return Err(CacheError::InvalidConfiguration(
                "sync interval must be greater than 0".to_string(),
            ));
        }
        Ok(Self::new(config.memory_capacity, config.max_item_size)?
            .with_sync_interval(Duration::from_secs(config.sync_interval)))
    }

    /// Sets the delay between sync passes. Takes effect on the next enable.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    // == Persistent Tier Lifecycle ==
    /// Opens a [`DiskStore`] at `path` and starts the sync daemon.
    pub async fn enable_persistent_tier(
        &self,
        max_bytes: u64,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        if max_bytes == 0 {
            return Err(CacheError::InvalidConfiguration(
                "disk cache size must be greater than 0".to_string(),
            ));
        }
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfiguration(
                "disk cache path must be set".to_string(),
            ));
        }

        let guard = self.begin_enable()?;

        let store = DiskStore::open(path, max_bytes)
            .await
            .map_err(CacheError::StoreInit)?;

        self.finish_enable(guard, Arc::new(store), Some(path.to_path_buf()));
        Ok(())
    }

    /// Starts the sync daemon over a caller-provided persistent store.
    pub async fn enable_persistent_store(&self, store: Arc<dyn PersistentStore>) -> Result<()> {
        let guard = self.begin_enable()?;
        self.finish_enable(guard, store, None);
        Ok(())
    }

    fn begin_enable(&self) -> Result<SettleGuard<'_>> {
        let mut tier = self.tier.lock();
        if tier.state != TierState::Disabled {
            return Err(CacheError::InvalidState(format!(
                "persistent tier is {:?}",
                tier.state
            )));
        }
        tier.state = TierState::Enabling;
        Ok(SettleGuard::new(&self.tier))
    }

    fn finish_enable(
        &self,
        guard: SettleGuard<'_>,
        store: Arc<dyn PersistentStore>,
        path: Option<PathBuf>,
    ) {
        let daemon = SyncDaemon::spawn(self.sync_context(), store.clone(), self.sync_interval);

        let mut tier = self.tier.lock();
        tier.store = Some(store);
        tier.daemon = Some(daemon);
        tier.path = path;
        tier.state = TierState::Running;
        guard.defuse();
        info!("Persistent tier enabled at {:?}", tier.path);
    }

    /// Stops the sync daemon and detaches the persistent store. Does
    /// nothing unless the tier is running.
    ///
    /// Dropping the returned future part way still completes the teardown:
    /// the daemon is aborted and the tier ends up `Disabled`.
    pub async fn disable_persistent_tier(&self) {
        let (daemon, _guard) = {
            let mut tier = self.tier.lock();
            if tier.state != TierState::Running {
                return;
            }
            tier.state = TierState::Disabling;
            (tier.daemon.take(), SettleGuard::new(&self.tier))
        };

        if let Some(daemon) = daemon {
            if !daemon.stop(SHUTDOWN_GRACE).await {
                warn!("Disk sync task did not stop within {:?}; aborted", SHUTDOWN_GRACE);
            }
        }

        info!("Persistent tier disabled");
    }

    pub fn persistent_tier_state(&self) -> TierState {
        self.tier.lock().state
    }

    /// Directory of the persistent tier, when enabled through a path.
    pub fn persistent_tier_path(&self) -> Option<PathBuf> {
        self.tier.lock().path.clone()
    }

    /// Reserved for an off-host object storage tier.
    pub fn enable_remote_tier(&self, _max_item_size_bytes: usize, _bucket: &str) -> Result<()> {
        Err(CacheError::NotImplemented("remote tier"))
    }

    // == Reads and Writes ==
    /// Returns the value for `key`, trying memory first and then the
    /// persistent tier if the key was persisted. Any failure is a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(value) = self.memory.get(key) {
            self.stats.record_memory_hit();
            return Some(value);
        }

        if self.sync_table.is_persisted(key) {
            if let Some(value) = self.read_persisted(key).await {
                self.stats.record_persistent_hit();
                return Some(value);
            }
        }

        self.stats.record_miss();
        None
    }

    async fn read_persisted(&self, key: &str) -> Option<Vec<u8>> {
        let store = self.persistent_store()?;

        let mut reader = match store.get(key).await {
            Ok(reader) => reader,
            Err(e) => {
                debug!("Persistent read of {} failed: {}", key, e);
                return None;
            }
        };

        let mut value = Vec::new();
        match reader.read_to_end(&mut value).await {
            Ok(_) => Some(value),
            Err(e) => {
                debug!("Persistent read of {} failed: {}", key, e);
                None
            }
        }
    }

    /// Stores `value` in the memory tier and marks `key` unpersisted.
    ///
    /// The sync table entry is reset even when the memory tier rejects the
    /// write.
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.sync_table.reset(key);

        match self.memory.set(key, value, None) {
            Ok(()) => {
                self.stats.record_write();
                Ok(())
            }
            Err(source) => {
                self.stats.record_write_failure();
                Err(CacheError::Write {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Removes `key` from the memory tier, reporting whether it was there.
    ///
    /// A persisted copy stays on disk, but the key is no longer flagged as
    /// persisted, so reads miss until it is written again.
    pub fn delete(&self, key: &str) -> bool {
        let found = self.memory.del(key);
        self.sync_table.demote(key);
        found
    }

    /// Wipes the memory tier. Sync table and disk are untouched.
    pub fn clear_memory_tier(&self) {
        self.memory.clear();
    }

    /// Overwrites every key on the persistent tier with an empty value.
    /// Individual failures are ignored.
    pub async fn clear_persistent_tier(&self) {
        let Some(store) = self.persistent_store() else {
            return;
        };

        for key in store.keys().await {
            if let Err(e) = store.put(&key, &[]).await {
                debug!("Failed to clear {} on persistent tier: {}", key, e);
            }
        }
    }

    // == Sync ==
    /// Runs one sync pass now, independent of the daemon's timer.
    pub async fn sync_now(&self) -> SyncReport {
        let Some(store) = self.persistent_store() else {
            self.logger
                .current()
                .log("[cachemachine] Disk Cache is not enabled");
            return SyncReport::default();
        };
        run_sync_pass(&self.sync_context(), store.as_ref()).await
    }

    pub fn sync_status(&self, key: &str) -> Option<SyncStatus> {
        self.sync_table.status(key)
    }

    // == Introspection ==
    /// The configured memory capacity, not live usage.
    pub fn memory_capacity(&self) -> usize {
        self.memory_capacity
    }

    pub fn max_item_size(&self) -> usize {
        self.max_item_size
    }

    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.sync_table.len())
    }

    /// Replaces the diagnostic sink, including for a running daemon.
    pub fn set_logger(&self, logger: Arc<dyn Logger>) {
        self.logger.replace(logger);
    }

    fn persistent_store(&self) -> Option<Arc<dyn PersistentStore>> {
        self.tier.lock().store.clone()
    }

    fn sync_context(&self) -> SyncContext {
        SyncContext {
            memory: self.memory.clone(),
            sync_table: self.sync_table.clone(),
            logger: self.logger.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl Drop for CacheMachine {
    fn drop(&mut self) {
        // stops and aborts a running daemon so it releases the stores
        let tier = self.tier.get_mut();
        drop(tier.daemon.take());
        tier.store = None;
    }
}

fn validate_sizes(memory_capacity_bytes: usize, max_item_size_bytes: usize) -> Result<()> {
    if memory_capacity_bytes == 0 {
        return Err(CacheError::InvalidConfiguration(
            "memory capacity must be greater than 0".to_string(),
        ));
    }
    if max_item_size_bytes == 0 {
        return Err(CacheError::InvalidConfiguration(
            "max item size must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
