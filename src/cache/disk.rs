//! Persistent Tier Module
//!
//! Directory-backed overflow store. One file per key, named by the hex
//! encoding of the key so the key set can be rebuilt from a directory scan.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::LruTracker;
use crate::error::StoreError;

/// Readable handle to a persisted value.
pub type ValueReader = Box<dyn AsyncRead + Send + Unpin>;

/// Item cap applied by [`DiskStore::open`].
pub const DEFAULT_MAX_ITEMS: usize = 1024;

const MAX_FILE_NAME_LEN: usize = 255;
const TMP_SUFFIX: &str = ".tmp";

// == Persistent Store Capability ==
/// A bounded key to bytes store backed by durable storage.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Writes `value`, replacing any prior value for `key`.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Opens the value for reading.
    async fn get(&self, key: &str) -> Result<ValueReader, StoreError>;

    /// Every key currently held.
    async fn keys(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
struct DiskIndex {
    sizes: HashMap<String, u64>,
    lru: LruTracker,
    total_bytes: u64,
}

impl DiskIndex {
    fn insert(&mut self, key: &str, size: u64) {
        if let Some(old) = self.sizes.insert(key.to_string(), size) {
            self.total_bytes -= old;
        }
        self.total_bytes += size;
        self.lru.touch(key);
    }

    fn pop_oldest(&mut self) -> Option<String> {
        let key = self.lru.evict_oldest()?;
        if let Some(size) = self.sizes.remove(&key) {
            self.total_bytes -= size;
        }
        Some(key)
    }
}

// == Disk Store ==
/// Default [`PersistentStore`] with a byte budget and an item cap, both
/// enforced by evicting the least recently used files.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    max_bytes: u64,
    max_items: usize,
    index: Mutex<DiskIndex>,
}

impl DiskStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>, max_bytes: u64) -> Result<Self, StoreError> {
        Self::open_with_max_items(root, max_bytes, DEFAULT_MAX_ITEMS).await
    }

    /// Opens a store with an explicit item cap. Files already in `root` are
    /// indexed oldest first and trimmed to the limits.
    pub async fn open_with_max_items(
        root: impl AsRef<Path>,
        max_bytes: u64,
        max_items: usize,
    ) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let mut found: Vec<(SystemTime, String, u64)> = Vec::new();
        let mut dir = fs::read_dir(&root).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                let _ = fs::remove_file(item.path()).await;
                continue;
            }
            let Some(key) = decode_file_name(&name) else {
                debug!("Ignoring foreign file in disk cache: {}", name);
                continue;
            };
            let meta = item.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, key, meta.len()));
        }
        found.sort();

        let store = Self {
            root,
            max_bytes,
            max_items,
            index: Mutex::new(DiskIndex::default()),
        };

        {
            let mut index = store.index.lock().await;
            for (_, key, size) in found {
                index.insert(&key, size);
            }
            store.trim(&mut index).await;
        }

        Ok(store)
    }

    /// Bytes currently held on disk.
    pub async fn used_bytes(&self) -> u64 {
        self.index.lock().await.total_bytes
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.sizes.len()
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(encode_file_name(key)?))
    }

    async fn trim(&self, index: &mut DiskIndex) {
        while index.total_bytes > self.max_bytes || index.sizes.len() > self.max_items {
            let Some(key) = index.pop_oldest() else {
                break;
            };
            let Ok(path) = self.path_for(&key) else {
                continue;
            };
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Evicted {} from disk cache", key),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to evict {} from disk cache: {}", key, e),
            }
        }
    }
}

#[async_trait]
impl PersistentStore for DiskStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let size = value.len() as u64;
        if size > self.max_bytes {
            return Err(StoreError::ValueTooLarge {
                size: value.len(),
                limit: usize::try_from(self.max_bytes).unwrap_or(usize::MAX),
            });
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);

        let mut index = self.index.lock().await;
        fs::write(&tmp, value).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        index.insert(key, size);
        self.trim(&mut index).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ValueReader, StoreError> {
        let path = self.path_for(key)?;
        let mut index = self.index.lock().await;
        if !index.sizes.contains_key(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(size) = index.sizes.remove(key) {
                    index.total_bytes -= size;
                }
                index.lru.remove(key);
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        index.lru.touch(key);
        Ok(Box::new(file))
    }

    async fn keys(&self) -> Vec<String> {
        self.index.lock().await.sizes.keys().cloned().collect()
    }
}

fn encode_file_name(key: &str) -> Result<String, StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key must not be empty".to_string()));
    }
    let name = hex::encode(key.as_bytes());
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(StoreError::InvalidKey(format!(
            "key of {} bytes is too long for the disk cache",
            key.len()
        )));
    }
    Ok(name)
}

fn decode_file_name(name: &str) -> Option<String> {
    let bytes = hex::decode(name).ok()?;
    String::from_utf8(bytes).ok()
}
