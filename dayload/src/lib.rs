//! # dayload
//!
//! Client-side orchestration layer between many uncoordinated callers and a
//! remote query endpoint.
//!
//! ## Features
//!
//! - **Deduplication**: concurrent requests for the same query share one network call
//! - **Bounded concurrency**: at most `max_concurrency` calls are outstanding
//! - **Two-tier cache**: in-process memory in front of a durable key-value store
//! - **Daily refresh**: cached data expires at a configurable hour, not on a TTL
//! - **Retry once**: transient failures are retried a single time after a short pause
//! - **Shutdown**: one signal aborts queued and running requests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dayload::{DataLoader, LoaderConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = DataLoader::new(LoaderConfig::new("http://localhost:8080")).await?;
//!
//!     let sales = loader.fetch("salesByRegion", Some(json!({"region": "north"}))).await?;
//!     println!("{}", sales);
//!
//!     loader.prefetch_all(["inventory", "topProducts"]).await;
//!     loader.shutdown();
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod loader;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use backend::{HttpBackend, QueryBackend};
pub use cache::{CacheStore, CachedValue, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LoaderConfig;
pub use error::{LoaderError, Result};
pub use key::cache_key;
pub use loader::{DataLoader, DataLoaderBuilder};
pub use scheduler::Scheduler;
pub use storage::{FileStore, FileStoreConfig, KeyValueStore, MemoryStore};
pub use types::{FetchResponse, FetchStatus, LoaderStats};
