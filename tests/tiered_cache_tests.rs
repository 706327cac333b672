//! Integration Tests for the tiered cache facade
//!
//! Covers memory/persistent tier interaction, the sync daemon and the
//! persistent tier lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cachemachine::cache::{
    DiskStore, MemoryStore, PersistentStore, RamStore, TierState, ValueReader,
};
use cachemachine::{CacheError, CacheMachine, Logger, StoreError, SyncReport, SyncStatus};
use parking_lot::Mutex;
use tempfile::TempDir;

// == Helpers ==

#[derive(Default)]
struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
}

/// Persistent store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl PersistentStore for BrokenStore {
    async fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }

    async fn get(&self, key: &str) -> Result<ValueReader, StoreError> {
        Err(StoreError::NotFound(key.to_string()))
    }

    async fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Waits for every other handle on `store` to be released.
async fn wait_until_sole_owner(store: &Arc<dyn PersistentStore>) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Arc::strong_count(store) > 1 {
        assert!(Instant::now() < deadline, "store is still shared");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A cache whose memory tier holds only 20 bytes, so tests can force
/// eviction with a couple of writes.
fn tiny_cache() -> (CacheMachine, Arc<RamStore>) {
    let memory = Arc::new(RamStore::new(20, 20));
    let cache = CacheMachine::with_memory_store(20, 20, memory.clone()).unwrap();
    (cache, memory)
}

// == Construction ==

#[test]
fn test_create_validates_sizes() {
    assert!(CacheMachine::new(10, 1024).is_ok());
    assert!(matches!(
        CacheMachine::new(0, 1024),
        Err(CacheError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        CacheMachine::new(10, 0),
        Err(CacheError::InvalidConfiguration(_))
    ));
    assert!(CacheMachine::with_memory_store(0, 1, Arc::new(RamStore::new(1, 1))).is_err());
}

#[test]
fn test_memory_capacity() {
    let cache = CacheMachine::new(10, 1024).unwrap();
    assert_eq!(cache.memory_capacity(), 10);
}

// == Memory Tier ==

#[tokio::test]
async fn test_set_and_get_two_keys() {
    let cache = CacheMachine::new(10, 1024).unwrap();

    cache.set("key1", b"12345").unwrap();
    cache.set("key2", b"67890").unwrap();
    cache.set("keyX", b"abcde").unwrap();

    assert_eq!(cache.get("key1").await.as_deref(), Some(&b"12345"[..]));
    assert_eq!(cache.get("key2").await.as_deref(), Some(&b"67890"[..]));
}

#[tokio::test]
async fn test_get_never_written_key() {
    let cache = CacheMachine::new(10, 1024).unwrap();
    assert_eq!(cache.get("missing").await, None);
    assert_eq!(cache.sync_status("missing"), None);
}

#[tokio::test]
async fn test_max_item_size_is_enforced() {
    let cache = CacheMachine::new(1024 * 1024, 16).unwrap();

    assert!(cache.set("small", b"ok").is_ok());
    let result = cache.set("large", &[0u8; 64]);

    assert!(matches!(
        result,
        Err(CacheError::Write {
            source: StoreError::ValueTooLarge { .. },
            ..
        })
    ));
    // the attempt is still tracked
    assert_eq!(cache.sync_status("large"), Some(SyncStatus::default()));
    assert_eq!(cache.get("large").await, None);
}

#[tokio::test]
async fn test_clear_memory_tier_keeps_sync_table() {
    let cache = CacheMachine::new(10, 1024).unwrap();
    cache.set("key1", b"12345").unwrap();

    cache.clear_memory_tier();

    assert_eq!(cache.get("key1").await, None);
    assert!(cache.sync_status("key1").is_some());
}

// == Persistent Tier ==

#[tokio::test]
async fn test_enable_set_disable_does_not_block() {
    let cache = CacheMachine::new(10, 1024).unwrap();
    let dir = TempDir::new().unwrap();

    cache.enable_persistent_tier(10, dir.path()).await.unwrap();
    cache.set("key1", b"12345").unwrap();

    let started = Instant::now();
    cache.disable_persistent_tier().await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(cache.persistent_tier_state(), TierState::Disabled);
}

#[tokio::test]
async fn test_sync_then_evict_falls_back_to_disk() {
    let (cache, memory) = tiny_cache();
    let dir = TempDir::new().unwrap();
    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();

    cache.set("key1", b"12345").unwrap();
    let report = cache.sync_now().await;
    assert_eq!(report.persisted, 1);
    assert_eq!(
        cache.sync_status("key1"),
        Some(SyncStatus {
            persisted: true,
            remote_synced: false
        })
    );

    // 4 + 10 bytes does not fit next to key1's 9 bytes
    cache.set("key2", b"abcdefghij").unwrap();
    assert!(memory.get("key1").is_none());

    assert_eq!(cache.get("key1").await.as_deref(), Some(&b"12345"[..]));
    assert_eq!(cache.stats().persistent_hits, 1);

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_unpersisted_evicted_key_is_lost_and_dropped() {
    let (cache, _memory) = tiny_cache();
    let dir = TempDir::new().unwrap();
    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();

    cache.set("key1", b"12345").unwrap();
    cache.set("key2", b"abcdefghij").unwrap();

    assert_eq!(cache.get("key1").await, None);

    let report = cache.sync_now().await;
    assert_eq!(
        report,
        SyncReport {
            persisted: 1,
            failed: 0,
            dropped: 1
        }
    );
    assert_eq!(cache.sync_status("key1"), None);
    assert!(cache.sync_status("key2").unwrap().persisted);

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_delete_hides_persisted_copy() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();
    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();

    cache.set("key1", b"12345").unwrap();
    cache.sync_now().await;

    assert!(cache.delete("key1"));
    assert_eq!(cache.get("key1").await, None);

    // the disk copy is deliberately left in place
    let disk = DiskStore::open(dir.path(), 1024).await.unwrap();
    assert_eq!(disk.keys().await, vec!["key1".to_string()]);
    assert!(cache.sync_status("key1").is_some());

    // the next pass drops the stale entry
    let report = cache.sync_now().await;
    assert_eq!(report.dropped, 1);
    assert_eq!(cache.sync_status("key1"), None);

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_rewrite_resets_persisted_flag() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();
    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();

    cache.set("key1", b"old").unwrap();
    cache.sync_now().await;
    assert!(cache.sync_status("key1").unwrap().persisted);

    cache.set("key1", b"new").unwrap();
    assert!(!cache.sync_status("key1").unwrap().persisted);

    cache.sync_now().await;
    cache.clear_memory_tier();
    assert_eq!(cache.get("key1").await.as_deref(), Some(&b"new"[..]));

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_daemon_syncs_on_its_own() {
    let cache = CacheMachine::new(1024, 1024)
        .unwrap()
        .with_sync_interval(Duration::from_millis(50));
    let dir = TempDir::new().unwrap();
    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();

    cache.set("key1", b"12345").unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while !cache.sync_status("key1").unwrap().persisted {
        assert!(Instant::now() < deadline, "daemon never persisted key1");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cache.stats().sync_passes >= 1);

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_disabled_tier_is_not_consulted() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();
    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();

    cache.set("key1", b"12345").unwrap();
    cache.sync_now().await;
    cache.disable_persistent_tier().await;
    cache.clear_memory_tier();

    assert_eq!(cache.get("key1").await, None);
}

#[tokio::test]
async fn test_reenable_serves_previous_files() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();

    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();
    cache.set("key1", b"12345").unwrap();
    cache.sync_now().await;
    cache.disable_persistent_tier().await;

    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();
    cache.clear_memory_tier();
    assert_eq!(cache.get("key1").await.as_deref(), Some(&b"12345"[..]));

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_clear_persistent_tier_blanks_values() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();
    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();

    cache.set("key1", b"12345").unwrap();
    cache.sync_now().await;
    cache.clear_memory_tier();

    cache.clear_persistent_tier().await;

    // the key is still flagged persisted, so the blanked value is served
    assert_eq!(cache.get("key1").await, Some(Vec::new()));

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_failed_sync_is_logged_and_retried() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let logger = Arc::new(RecordingLogger::default());
    cache.set_logger(logger.clone());
    cache
        .enable_persistent_store(Arc::new(BrokenStore))
        .await
        .unwrap();

    cache.set("key1", b"12345").unwrap();

    let first = cache.sync_now().await;
    let second = cache.sync_now().await;

    assert_eq!(first.failed, 1);
    assert_eq!(second.failed, 1);
    assert!(!cache.sync_status("key1").unwrap().persisted);
    assert!(logger
        .lines()
        .iter()
        .all(|line| line.contains("Error syncing to disk")));
    assert_eq!(logger.lines().len(), 2);

    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_custom_logger_sees_sync_summary() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();
    let logger = Arc::new(RecordingLogger::default());
    cache.set_logger(logger.clone());

    cache.sync_now().await;
    assert_eq!(logger.lines(), vec!["[cachemachine] Disk Cache is not enabled"]);

    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();
    cache.set("a", b"1").unwrap();
    cache.set("b", b"2").unwrap();
    cache.sync_now().await;

    assert_eq!(
        logger.lines().last().map(String::as_str),
        Some("[cachemachine] Synced 2 items to disk")
    );

    cache.disable_persistent_tier().await;
}

// == Lifecycle Under Cancellation ==

#[tokio::test]
async fn test_cancelled_enable_leaves_tier_disabled() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();

    // the disk open yields on its first poll, so a zero timeout drops the
    // enable future part way through
    match tokio::time::timeout(
        Duration::ZERO,
        cache.enable_persistent_tier(1024, dir.path()),
    )
    .await
    {
        Err(_) => assert_eq!(cache.persistent_tier_state(), TierState::Disabled),
        Ok(result) => {
            result.unwrap();
            cache.disable_persistent_tier().await;
        }
    }

    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();
    assert_eq!(cache.persistent_tier_state(), TierState::Running);
    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_cancelled_disable_finishes_teardown() {
    let cache = CacheMachine::new(1024, 1024).unwrap();
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn PersistentStore> =
        Arc::new(DiskStore::open(dir.path(), 1024).await.unwrap());
    cache.enable_persistent_store(store.clone()).await.unwrap();

    let _ = tokio::time::timeout(Duration::ZERO, cache.disable_persistent_tier()).await;
    assert_eq!(cache.persistent_tier_state(), TierState::Disabled);

    // the aborted daemon lets go of the store
    wait_until_sole_owner(&store).await;

    cache.enable_persistent_tier(1024, dir.path()).await.unwrap();
    assert_eq!(cache.persistent_tier_state(), TierState::Running);
    cache.disable_persistent_tier().await;
}

#[tokio::test]
async fn test_dropping_cache_stops_daemon() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn PersistentStore> =
        Arc::new(DiskStore::open(dir.path(), 1024).await.unwrap());

    let cache = CacheMachine::new(1024, 1024).unwrap();
    cache.enable_persistent_store(store.clone()).await.unwrap();
    assert!(Arc::strong_count(&store) > 1);

    drop(cache);

    wait_until_sole_owner(&store).await;
}

#[tokio::test]
async fn test_remote_tier_is_not_implemented() {
    let cache = CacheMachine::new(10, 1024).unwrap();
    assert!(matches!(
        cache.enable_remote_tier(1024, "bucket"),
        Err(CacheError::NotImplemented(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_with_running_daemon() {
    let cache = Arc::new(
        CacheMachine::new(1024 * 1024, 1024)
            .unwrap()
            .with_sync_interval(Duration::from_millis(10)),
    );
    let dir = TempDir::new().unwrap();
    cache
        .enable_persistent_tier(1024 * 1024, dir.path())
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|t| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let key = format!("k{}-{}", t, i);
                    cache.set(&key, key.as_bytes()).unwrap();
                    assert_eq!(cache.get(&key).await.as_deref(), Some(key.as_bytes()));
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    cache.sync_now().await;
    assert_eq!(cache.stats().tracked_keys, 400);
    for t in 0..8 {
        assert!(cache.sync_status(&format!("k{}-49", t)).unwrap().persisted);
    }

    cache.disable_persistent_tier().await;
}
