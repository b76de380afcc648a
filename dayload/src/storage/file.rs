//! File-backed [`KeyValueStore`]
//!
//! The whole map lives in memory and is mirrored to `store.json` in the
//! configured directory after every mutation. Writes go to a temp file that is
//! renamed over the previous snapshot.

use super::KeyValueStore;
use crate::error::{LoaderError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const STORE_FILE: &str = "store.json";
const STORE_TMP_FILE: &str = "store.json.tmp";

/// File store configuration
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub directory: PathBuf,
    /// Upper bound on the serialized size of all entries
    pub max_bytes: Option<u64>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./data/dayload"),
            max_bytes: Some(5 * 1024 * 1024),
        }
    }
}

/// Durable store backed by a JSON document
#[derive(Clone)]
pub struct FileStore {
    config: FileStoreConfig,
    data: Arc<RwLock<HashMap<String, String>>>,
    // serializes snapshot writes so an older map never lands last
    persist_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Create or open a store in `config.directory`
    pub fn open(config: FileStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.directory).map_err(|e| LoaderError::CacheIo(e.to_string()))?;

        let path = config.directory.join(STORE_FILE);
        let data = if path.exists() {
            let contents =
                fs::read_to_string(&path).map_err(|e| LoaderError::CacheIo(e.to_string()))?;
            serde_json::from_str(&contents)
                .map_err(|e| LoaderError::CacheIo(format!("Failed to parse store: {}", e)))?
        } else {
            HashMap::new()
        };

        info!(
            "Opened file store at {} ({} entries)",
            config.directory.display(),
            data.len()
        );

        Ok(Self {
            config,
            data: Arc::new(RwLock::new(data)),
            persist_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Serialized size of the current contents
    pub fn size_bytes(&self) -> u64 {
        Self::measure(&self.data.read())
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn measure(map: &HashMap<String, String>) -> u64 {
        map.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
    }

    /// Apply `mutate` to a copy of the map, write it to disk, and only then
    /// make it visible. A failed write leaves the store unchanged.
    async fn mutate_and_persist<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>) -> Result<()>,
    {
        // held across the write, so `data` cannot change underneath us
        let _guard = self.persist_lock.lock().await;

        let mut next = self.data.read().clone();
        mutate(&mut next)?;

        if let Some(max) = self.config.max_bytes {
            let size = Self::measure(&next);
            if size > max {
                return Err(LoaderError::CacheIo(format!(
                    "quota exceeded: {} > {} bytes",
                    size, max
                )));
            }
        }

        let snapshot = serde_json::to_string(&next)
            .map_err(|e| LoaderError::CacheIo(format!("Failed to serialize store: {}", e)))?;

        let tmp = self.config.directory.join(STORE_TMP_FILE);
        let path = self.config.directory.join(STORE_FILE);
        tokio::fs::write(&tmp, snapshot)
            .await
            .map_err(|e| LoaderError::CacheIo(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| LoaderError::CacheIo(e.to_string()))?;

        *self.data.write() = next;
        debug!("Persisted file store snapshot to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.mutate_and_persist(move |map| {
            map.insert(key, value);
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !self.data.read().contains_key(key) {
            return Ok(());
        }
        self.mutate_and_persist(|map| {
            map.remove(key);
            Ok(())
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }
}
