//! In-process cache tier
//!
//! Sits in front of the [`CacheStore`](super::CacheStore). Entries keep the
//! timestamp of the value they mirror so that a long-lived process stops
//! serving them once the daily boundary passes.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Arc<Value>,
    created_at_ms: i64,
}

/// Map from cache key to shared value
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key` if it was written at or after `period_start_ms`.
    ///
    /// Stale entries are dropped on the way out.
    pub fn get(&self, key: &str, period_start_ms: i64) -> Option<Arc<Value>> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.created_at_ms >= period_start_ms => {
                    return Some(Arc::clone(&entry.value));
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write();
        if entries
            .get(key)
            .is_some_and(|e| e.created_at_ms < period_start_ms)
        {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: Arc<Value>, created_at_ms: i64) {
        self.entries.write().insert(
            key.into(),
            MemoryEntry {
                value,
                created_at_ms,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
