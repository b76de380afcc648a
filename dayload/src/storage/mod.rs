//! Durable key-value storage
//!
//! The persistent cache tier talks to storage through [`KeyValueStore`] so the
//! host can plug in whatever durable medium it has:
//! - [`MemoryStore`]: process-local map, for tests and ephemeral hosts
//! - [`FileStore`]: JSON document on disk with an optional byte quota
//!
//! Implementations report failures as [`LoaderError::CacheIo`]; the cache
//! layer downgrades them to misses.
//!
//! [`LoaderError::CacheIo`]: crate::error::LoaderError::CacheIo

pub mod file;
pub mod memory;

pub use file::{FileStore, FileStoreConfig};
pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;

/// String-keyed, string-valued durable store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently held
    async fn keys(&self) -> Result<Vec<String>>;
}
