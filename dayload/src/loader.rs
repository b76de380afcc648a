//! Fetch orchestration
//!
//! [`DataLoader::fetch`] resolves a query through, in order:
//!
//! ```text
//! memory cache ─hit─► return
//!      │ miss
//! cache store ─hit─► promote to memory, return
//!      │ miss
//! in-flight map ─hit─► await the shared outcome
//!      │ miss
//! scheduler queue ─► network call (timeout, retry once) ─► fill both tiers
//! ```
//!
//! At most one request per cache key is outstanding at any time, and the
//! scheduler bounds the number of concurrent network calls.

use crate::backend::{HttpBackend, QueryBackend};
use crate::cache::{CacheStore, MemoryCache};
use crate::clock::{Clock, SystemClock};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::key::cache_key;
use crate::scheduler::Scheduler;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::types::{FetchResponse, LoaderStats};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type SharedOutcome = Shared<BoxFuture<'static, Result<Arc<Value>>>>;

struct InFlightRequest {
    id: u64,
    outcome: SharedOutcome,
    cancel: CancellationToken,
}

/// Builder for [`DataLoader`]
pub struct DataLoaderBuilder {
    config: LoaderConfig,
    backend: Option<Arc<dyn QueryBackend>>,
    storage: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl DataLoaderBuilder {
    /// Query backend. Defaults to [`HttpBackend`] built from the config.
    pub fn backend(mut self, backend: Arc<dyn QueryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Durable store for the persistent tier. Defaults to a [`MemoryStore`].
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub async fn build(self) -> Result<DataLoader> {
        let config = self.config;
        config.validate()?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(&config)?),
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let store = CacheStore::open(
            storage,
            clock,
            config.namespace.clone(),
            config.config_key.clone(),
            config.refresh_hour,
        )
        .await;

        info!(
            "Initializing data loader with max_concurrency={}, timeout={:?}, max_retries={}",
            config.max_concurrency, config.timeout, config.max_retries
        );

        Ok(DataLoader {
            inner: Arc::new(LoaderInner {
                backend,
                memory: MemoryCache::new(),
                store,
                scheduler: Scheduler::new(config.max_concurrency),
                in_flight: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                cache_enabled: AtomicBool::new(config.cache_enabled),
                stats: RwLock::new(LoaderStats::default()),
                config,
            }),
        })
    }
}

/// Deduplicating, cache-backed query loader.
///
/// Cheap to clone; clones share caches, queue and in-flight requests.
#[derive(Clone)]
pub struct DataLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    config: LoaderConfig,
    backend: Arc<dyn QueryBackend>,
    memory: MemoryCache,
    store: CacheStore,
    scheduler: Arc<Scheduler>,
    in_flight: Mutex<HashMap<String, InFlightRequest>>,
    next_request_id: AtomicU64,
    shutdown: CancellationToken,
    cache_enabled: AtomicBool,
    stats: RwLock<LoaderStats>,
}

impl DataLoader {
    pub fn builder(config: LoaderConfig) -> DataLoaderBuilder {
        DataLoaderBuilder {
            config,
            backend: None,
            storage: None,
            clock: None,
        }
    }

    /// Loader over HTTP with an in-memory persistent tier
    pub async fn new(config: LoaderConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    /// Resolve `query_key` with `params`.
    ///
    /// Callers requesting the same canonical key while a request is queued or
    /// running share its outcome. After [`shutdown`](Self::shutdown) every
    /// call resolves to [`LoaderError::Aborted`].
    pub async fn fetch(&self, query_key: &str, params: Option<Value>) -> Result<Arc<Value>> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            inner.stats.write().aborts += 1;
            return Err(LoaderError::Aborted);
        }

        let key = cache_key(query_key, params.as_ref());
        if let Some(value) = inner.lookup_cached(&key).await {
            return Ok(value);
        }

        let outcome = inner.join_or_start(&key, query_key, params);
        tokio::select! {
            biased;
            result = outcome => result,
            _ = inner.shutdown.cancelled() => Err(LoaderError::Aborted),
        }
    }

    /// [`fetch`](Self::fetch) and deserialize the payload into `T`
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        query_key: &str,
        params: Option<Value>,
    ) -> Result<T> {
        let value = self.fetch(query_key, params).await?;
        Ok(T::deserialize(&*value)?)
    }

    /// [`fetch`](Self::fetch) folded into the `{status, data | message}` envelope
    pub async fn fetch_response(&self, query_key: &str, params: Option<Value>) -> FetchResponse {
        FetchResponse::from(self.fetch(query_key, params).await)
    }

    /// Warm the caches for `query_keys` (without params). Failures are logged
    /// and otherwise ignored.
    pub async fn prefetch_all<I, S>(&self, query_keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fetches = query_keys.into_iter().map(|query_key| {
            let query_key = query_key.as_ref().to_string();
            async move {
                if let Err(e) = self.fetch(&query_key, None).await {
                    warn!("Prefetch of {} failed: {}", query_key, e);
                }
            }
        });
        futures::future::join_all(fetches).await;
    }

    /// Abort the outstanding request for this query, if any.
    ///
    /// Its waiters resolve to [`LoaderError::Aborted`] immediately, whether the
    /// request was running or still queued. The next fetch of the same query
    /// starts a fresh request.
    pub fn cancel(&self, query_key: &str, params: Option<&Value>) -> bool {
        let key = cache_key(query_key, params);
        let removed = self.inner.in_flight.lock().remove(&key);
        match removed {
            Some(request) => {
                debug!("Cancelling in-flight request {}", key);
                request.cancel.cancel();
                self.inner.stats.write().aborts += 1;
                true
            }
            None => false,
        }
    }

    /// Abort everything and refuse new work.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return;
        }
        inner.shutdown.cancel();

        let dropped = inner.scheduler.drain();
        let abandoned = {
            let mut in_flight = inner.in_flight.lock();
            let count = in_flight.len();
            in_flight.clear();
            count
        };
        // queued tasks never run and running ones find their entry gone
        inner.stats.write().aborts += abandoned as u64;
        info!(
            "Data loader shut down ({} queued dropped, {} in flight abandoned)",
            dropped, abandoned
        );
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Drop one query from both cache tiers
    pub async fn invalidate(&self, query_key: &str, params: Option<&Value>) {
        let key = cache_key(query_key, params);
        self.inner.memory.remove(&key);
        self.inner.store.remove(&key).await;
        debug!("Invalidated {}", key);
    }

    /// Empty both cache tiers. Returns the number of persisted entries removed.
    pub async fn clear_cache(&self) -> usize {
        self.inner.memory.clear();
        self.inner.store.clear_all().await
    }

    /// Turn caching on or off. Disabling also empties both tiers.
    pub async fn set_cache_enabled(&self, enabled: bool) {
        let was_enabled = self.inner.cache_enabled.swap(enabled, Ordering::SeqCst);
        if was_enabled && !enabled {
            info!("Caching disabled, clearing cache tiers");
            self.clear_cache().await;
        } else if !was_enabled && enabled {
            info!("Caching enabled");
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.inner.cache_enabled()
    }

    pub fn refresh_hour(&self) -> u8 {
        self.inner.store.refresh_hour()
    }

    /// See [`CacheStore::set_refresh_hour`]
    pub async fn set_refresh_hour(&self, hour: i64) -> Result<()> {
        self.inner.store.set_refresh_hour(hour).await
    }

    pub fn cache_store(&self) -> &CacheStore {
        &self.inner.store
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> LoaderStats {
        let mut stats = self.inner.stats.read().clone();
        stats.active_requests = self.inner.scheduler.active_requests();
        stats.queued_requests = self.inner.scheduler.queued_requests();
        stats.in_flight = self.inner.in_flight.lock().len();
        stats
    }
}

impl LoaderInner {
    fn cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::SeqCst)
    }

    async fn lookup_cached(&self, key: &str) -> Option<Arc<Value>> {
        if !self.cache_enabled() {
            return None;
        }

        let period_start = self.store.period_start_millis();
        if let Some(value) = self.memory.get(key, period_start) {
            debug!("Memory cache hit: {}", key);
            self.stats.write().memory_hits += 1;
            return Some(value);
        }

        let hit = self.store.get(key).await?;
        debug!("Cache store hit: {}", key);
        let value = Arc::new(hit.value);
        self.memory
            .insert(key, Arc::clone(&value), hit.created_at_ms);
        self.stats.write().store_hits += 1;
        Some(value)
    }

    /// Attach to the in-flight request for `key`, or queue a new one.
    fn join_or_start(
        self: &Arc<Self>,
        key: &str,
        query_key: &str,
        params: Option<Value>,
    ) -> SharedOutcome {
        let mut in_flight = self.in_flight.lock();
        if let Some(request) = in_flight.get(key) {
            debug!("Joining in-flight request: {}", key);
            self.stats.write().dedup_joins += 1;
            return request.outcome.clone();
        }

        // a request that settled after our cache probe has already filled memory
        if self.cache_enabled() {
            if let Some(value) = self.memory.get(key, self.store.period_start_millis()) {
                self.stats.write().memory_hits += 1;
                return futures::future::ready(Ok(value)).boxed().shared();
            }
        }

        self.stats.write().misses += 1;

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let (tx, rx) = oneshot::channel();
        let cancelled = cancel.clone();
        let outcome: SharedOutcome = async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => Err(LoaderError::Aborted),
                result = rx => result.unwrap_or(Err(LoaderError::Aborted)),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            key.to_string(),
            InFlightRequest {
                id,
                outcome: outcome.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(in_flight);

        debug!("Queueing request: {}", key);
        let task = Arc::clone(self).run_task(
            id,
            key.to_string(),
            query_key.to_string(),
            params.unwrap_or_else(|| Value::Array(Vec::new())),
            cancel,
            tx,
        );
        self.scheduler.enqueue(task.boxed());

        outcome
    }

    async fn run_task(
        self: Arc<Self>,
        id: u64,
        key: String,
        query_key: String,
        params: Value,
        cancel: CancellationToken,
        tx: oneshot::Sender<Result<Arc<Value>>>,
    ) {
        let result = match self
            .execute_with_retry(&key, &query_key, &params, &cancel)
            .await
        {
            Ok(value) => {
                let value = Arc::new(value);
                if self.cache_enabled() && !cancel.is_cancelled() {
                    let created_at = self.store.set(&key, &value).await;
                    self.memory.insert(key.as_str(), Arc::clone(&value), created_at);
                }
                Ok(value)
            }
            Err(LoaderError::Aborted) => {
                debug!("Request aborted: {}", key);
                Err(LoaderError::Aborted)
            }
            Err(e) => {
                warn!("Request {} failed: {}", key, e);
                self.stats.write().failures += 1;
                Err(e)
            }
        };

        let owned = {
            let mut in_flight = self.in_flight.lock();
            let owned = in_flight.get(&key).is_some_and(|request| request.id == id);
            if owned {
                in_flight.remove(&key);
            }
            owned
        };
        // cancel() and shutdown() count the aborts of entries they remove
        if owned && result.as_ref().is_err_and(LoaderError::is_aborted) {
            self.stats.write().aborts += 1;
        }
        let _ = tx.send(result);
    }

    async fn execute_with_retry(
        &self,
        key: &str,
        query_key: &str,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let timeout = self.config.timeout;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(LoaderError::Aborted);
            }

            attempt += 1;
            self.stats.write().network_calls += 1;
            debug!("Executing {} (attempt {})", key, attempt);

            let call = tokio::time::timeout(timeout, self.backend.execute(query_key, params));
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LoaderError::Aborted),
                result = call => result.unwrap_or(Err(LoaderError::Timeout(timeout))),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if cancel.is_cancelled() || err.is_aborted() {
                return Err(LoaderError::Aborted);
            }
            if !err.is_transient() || attempt > self.config.max_retries {
                return Err(err);
            }

            warn!(
                "Transient failure for {} ({}), retrying in {:?}",
                key, err, self.config.retry_backoff
            );
            self.stats.write().retries += 1;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LoaderError::Aborted),
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
            }
        }
    }
}
