//! Common test utilities

use async_trait::async_trait;
use dayload::{
    Clock, DataLoader, KeyValueStore, LoaderConfig, LoaderError, ManualClock, MemoryStore,
    QueryBackend, Result,
};
use mockito::{Server, ServerGuard};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Route library logs to the test harness output
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Config with short backoff for fast retry tests
#[allow(dead_code)]
pub fn fast_config() -> LoaderConfig {
    LoaderConfig::new("http://localhost:8080")
        .with_retry_backoff(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5))
}

/// In-process backend that plays back scripted outcomes.
///
/// Each call pops the next scripted result; once the script is empty it
/// answers `{"query": <key>, "params": <params>}`. Tracks total and peak
/// concurrent calls.
#[derive(Default)]
pub struct ScriptedBackend {
    delay: Duration,
    script: Mutex<VecDeque<Result<Value>>>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn push(&self, outcome: Result<Value>) {
        self.script.lock().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Query names in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl QueryBackend for ScriptedBackend {
    async fn execute(&self, query_key: &str, params: &Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(query_key.to_string());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(json!({"query": query_key, "params": params})))
    }
}

/// Store whose every operation fails, like a browser store over quota
#[allow(dead_code)]
#[derive(Default)]
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(LoaderError::CacheIo("storage unavailable".into()))
    }

    async fn set(&self, _key: &str, _value: String) -> Result<()> {
        Err(LoaderError::CacheIo("quota exceeded".into()))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(LoaderError::CacheIo("storage unavailable".into()))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Err(LoaderError::CacheIo("storage unavailable".into()))
    }
}

/// Loader over `backend` with a fresh in-memory store and the system clock
#[allow(dead_code)]
pub async fn loader_with(config: LoaderConfig, backend: Arc<ScriptedBackend>) -> DataLoader {
    DataLoader::builder(config)
        .backend(backend)
        .build()
        .await
        .unwrap()
}

/// Loader over `backend` sharing `storage` and driven by `clock`
#[allow(dead_code)]
pub async fn loader_at(
    backend: Arc<ScriptedBackend>,
    storage: MemoryStore,
    clock: ManualClock,
) -> DataLoader {
    DataLoader::builder(fast_config())
        .backend(backend)
        .storage(Arc::new(storage))
        .clock(Arc::new(clock) as Arc<dyn Clock>)
        .build()
        .await
        .unwrap()
}

/// Setup a loader pointing to a mock query endpoint
#[allow(dead_code)]
pub async fn setup_http_loader() -> (DataLoader, ServerGuard) {
    let server = Server::new_async().await;
    let config = LoaderConfig::new(server.url())
        .with_timeout(Duration::from_secs(5))
        .with_retry_backoff(Duration::from_millis(10));
    let loader = DataLoader::new(config).await.unwrap();
    (loader, server)
}
