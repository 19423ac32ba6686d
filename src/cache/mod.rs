//! Query cache module
//!
//! Memoizes the results of expensive lookups keyed by resource name and
//! parameter set, with per-entry TTL and bounded capacity.

mod query_cache;
mod types;

pub use query_cache::QueryCache;
pub use types::{
    cache_key, CacheConfig, CacheEntry, CacheStats, DEFAULT_MAX_SIZE, DEFAULT_TTL_MS,
};
