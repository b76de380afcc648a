//! Cache Module
//!
//! Two tiers in front of the query backend:
//! - Memory: in-process map, checked first
//! - Store: durable [`KeyValueStore`](crate::storage::KeyValueStore) entries
//!
//! Both tiers expire at the same daily boundary, see [`period`].

pub mod memory;
pub mod period;
pub mod store;

pub use memory::MemoryCache;
pub use period::{DEFAULT_REFRESH_HOUR, period_start};
pub use store::{CacheStore, CachedValue};
