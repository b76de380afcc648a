//! Persistent cache tier
//!
//! Entries are stored as `{"data": .., "timestamp": <ms epoch>}` under
//! `<namespace><cache key>`; the refresh hour lives under its own key as
//! `{"updateHour": n}`. Nothing is evicted: an entry older than the current
//! period start reads as a miss and is replaced by the next write.
//!
//! Storage failures are logged and swallowed. The cache is an optimization
//! and must never fail a request.

use super::period::{self, DEFAULT_REFRESH_HOUR};
use crate::clock::Clock;
use crate::error::Result;
use crate::storage::KeyValueStore;
use chrono::{DateTime, FixedOffset};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    data: Value,
    timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedConfig {
    update_hour: i64,
}

/// A fresh value read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: Value,
    pub created_at_ms: i64,
}

/// Durable cache with a daily validity window
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    config_key: String,
    refresh_hour: RwLock<u8>,
}

impl CacheStore {
    /// Open the cache over `store`, loading the persisted refresh hour.
    ///
    /// A missing or unreadable config record falls back to `default_hour`.
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
        config_key: impl Into<String>,
        default_hour: u8,
    ) -> Self {
        let config_key = config_key.into();
        let default_hour = if default_hour <= 23 {
            default_hour
        } else {
            DEFAULT_REFRESH_HOUR
        };

        let refresh_hour = match store.get(&config_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedConfig>(&raw)
                .ok()
                .and_then(|c| period::validate_refresh_hour(c.update_hour).ok())
            {
                Some(hour) => hour,
                None => {
                    warn!("Ignoring unreadable cache config record: {}", raw);
                    default_hour
                }
            },
            Ok(None) => default_hour,
            Err(e) => {
                warn!("Failed to read cache config, using default: {}", e);
                default_hour
            }
        };

        info!("Cache store opened (refresh_hour={})", refresh_hour);

        Self {
            store,
            clock,
            namespace: namespace.into(),
            config_key,
            refresh_hour: RwLock::new(refresh_hour),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Fresh value for `key`, or `None` on miss, stale entry or I/O failure
    pub async fn get(&self, key: &str) -> Option<CachedValue> {
        let raw = match self.store.get(&self.storage_key(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let entry: PersistedEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Discarding malformed cache entry {}: {}", key, e);
                return None;
            }
        };

        if entry.timestamp < self.period_start_millis() {
            debug!("Cache entry {} is from a previous period", key);
            return None;
        }

        Some(CachedValue {
            value: entry.data,
            created_at_ms: entry.timestamp,
        })
    }

    /// Write `value` stamped with the current time and return that stamp.
    pub async fn set(&self, key: &str, value: &Value) -> i64 {
        let timestamp = self.clock.now_millis();
        let entry = PersistedEntry {
            data: value.clone(),
            timestamp,
        };

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.storage_key(key), raw).await {
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to serialize cache entry {}: {}", key, e),
        }

        timestamp
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(&self.storage_key(key)).await {
            warn!("Cache remove failed for {}: {}", key, e);
        }
    }

    /// Write timestamp of the persisted entry, fresh or not
    pub async fn entry_timestamp(&self, key: &str) -> Option<i64> {
        let raw = self.store.get(&self.storage_key(key)).await.ok()??;
        serde_json::from_str::<PersistedEntry>(&raw)
            .ok()
            .map(|e| e.timestamp)
    }

    /// Remove every entry in this cache's namespace. Returns how many were removed.
    pub async fn clear_all(&self) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list cache keys: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys
            .iter()
            .filter(|k| k.starts_with(&self.namespace) && **k != self.config_key)
        {
            match self.store.remove(key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove cache key {}: {}", key, e),
            }
        }

        info!("Cleared {} cache entries", removed);
        removed
    }

    pub fn refresh_hour(&self) -> u8 {
        *self.refresh_hour.read()
    }

    /// Change the refresh hour. Out-of-range input is rejected untouched.
    ///
    /// Existing entries keep their timestamps; only the computed period start
    /// moves.
    pub async fn set_refresh_hour(&self, hour: i64) -> Result<()> {
        let hour = period::validate_refresh_hour(hour)?;
        *self.refresh_hour.write() = hour;

        let record = PersistedConfig {
            update_hour: i64::from(hour),
        };
        match serde_json::to_string(&record) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.config_key, raw).await {
                    warn!("Failed to persist refresh hour: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize cache config: {}", e),
        }

        info!("Cache refresh hour set to {}", hour);
        Ok(())
    }

    pub fn period_start(&self) -> DateTime<FixedOffset> {
        self.clock.period_start(self.refresh_hour())
    }

    pub fn period_start_millis(&self) -> i64 {
        self.period_start().timestamp_millis()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    const NS: &str = "dayload:cache:";
    const CONFIG: &str = "dayload:config";

    async fn open_at(when: &str) -> (CacheStore, MemoryStore, ManualClock) {
        let backing = MemoryStore::new();
        let clock = ManualClock::at(when).unwrap();
        let store = CacheStore::open(
            Arc::new(backing.clone()),
            Arc::new(clock.clone()),
            NS,
            CONFIG,
            DEFAULT_REFRESH_HOUR,
        )
        .await;
        (store, backing, clock)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (store, backing, _) = open_at("2024-03-10T09:00:00+00:00").await;
        store.set("getX[]", &json!({"rows": [1, 2]})).await;

        let hit = store.get("getX[]").await.unwrap();
        assert_eq!(hit.value, json!({"rows": [1, 2]}));

        let raw = backing.get("dayload:cache:getX[]").await.unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["data"], json!({"rows": [1, 2]}));
        assert_eq!(stored["timestamp"], json!(hit.created_at_ms));
    }

    #[tokio::test]
    async fn test_entry_before_boundary_is_stale() {
        let (store, _, clock) = open_at("2024-03-10T07:59:00+00:00").await;
        store.set("k", &json!(1)).await;
        assert!(store.get("k").await.is_some());

        clock.advance(ChronoDuration::minutes(2));
        assert!(store.get("k").await.is_none());
        // stale entries are not purged, only hidden
        assert!(store.entry_timestamp("k").await.is_some());
    }

    #[tokio::test]
    async fn test_entry_after_boundary_readable_next_morning() {
        let (store, _, clock) = open_at("2024-03-10T08:01:00+00:00").await;
        store.set("k", &json!("fresh")).await;

        clock.set(DateTime::parse_from_rfc3339("2024-03-11T07:59:00+00:00").unwrap());
        assert_eq!(store.get("k").await.unwrap().value, json!("fresh"));
    }

    #[tokio::test]
    async fn test_write_replaces_stale_entry() {
        let (store, _, clock) = open_at("2024-03-10T07:00:00+00:00").await;
        store.set("k", &json!("old")).await;
        clock.advance(ChronoDuration::hours(2));
        assert!(store.get("k").await.is_none());

        store.set("k", &json!("new")).await;
        assert_eq!(store.get("k").await.unwrap().value, json!("new"));
    }

    #[tokio::test]
    async fn test_refresh_hour_persisted() {
        let (store, backing, clock) = open_at("2024-03-10T09:00:00+00:00").await;
        assert_eq!(store.refresh_hour(), 8);

        store.set_refresh_hour(6).await.unwrap();
        let raw = backing.get(CONFIG).await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&raw).unwrap(), json!({"updateHour": 6}));

        let reopened = CacheStore::open(
            Arc::new(backing.clone()),
            Arc::new(clock),
            NS,
            CONFIG,
            DEFAULT_REFRESH_HOUR,
        )
        .await;
        assert_eq!(reopened.refresh_hour(), 6);
    }

    #[tokio::test]
    async fn test_invalid_refresh_hour_rejected() {
        let (store, backing, _) = open_at("2024-03-10T09:00:00+00:00").await;
        let err = store.set_refresh_hour(24).await.unwrap_err();
        assert!(matches!(err, crate::error::LoaderError::Config(_)));
        assert_eq!(store.refresh_hour(), 8);
        assert!(backing.get(CONFIG).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_hour_change_moves_boundary() {
        let (store, _, clock) = open_at("2024-03-10T08:30:00+00:00").await;
        store.set("k", &json!(1)).await;

        // boundary moves from 08:00 to 09:00 today, once the clock passes it
        store.set_refresh_hour(9).await.unwrap();
        assert!(store.get("k").await.is_some());
        clock.advance(ChronoDuration::hours(1));
        assert!(store.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_config_falls_back() {
        let backing = MemoryStore::new();
        backing
            .set(CONFIG, r#"{"updateHour": 99}"#.into())
            .await
            .unwrap();
        let store = CacheStore::open(
            Arc::new(backing),
            Arc::new(ManualClock::at("2024-03-10T09:00:00+00:00").unwrap()),
            NS,
            CONFIG,
            5,
        )
        .await;
        assert_eq!(store.refresh_hour(), 5);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_miss() {
        let (store, backing, _) = open_at("2024-03-10T09:00:00+00:00").await;
        backing
            .set("dayload:cache:k", "{not json".into())
            .await
            .unwrap();
        assert!(store.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_all_keeps_foreign_keys_and_config() {
        let (store, backing, _) = open_at("2024-03-10T09:00:00+00:00").await;
        store.set("a", &json!(1)).await;
        store.set("b", &json!(2)).await;
        store.set_refresh_hour(7).await.unwrap();
        backing.set("other-app", "x".into()).await.unwrap();

        assert_eq!(store.clear_all().await, 2);
        assert!(store.get("a").await.is_none());
        assert!(backing.get("other-app").await.unwrap().is_some());
        assert!(backing.get(CONFIG).await.unwrap().is_some());
    }
}
