//! TTL cache with approximate LRU eviction
//!
//! Expired entries are dropped lazily: on the `get` that finds them and by
//! the sweep every `set` runs first. Once full, a `set` evicts the tenth of
//! capacity that was accessed longest ago.

use super::types::{cache_key, CacheConfig, CacheEntry, CacheStats};
use crate::logging::{log_debug, log_info, Logger};
use crate::types::JsonObject;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    expirations: u64,
    evictions: u64,
}

#[derive(Debug)]
struct Store<V> {
    entries: HashMap<String, CacheEntry<V>>,
    counters: Counters,
}

/// Memoizes producer results by resource name and parameters.
///
/// Concurrent misses on one key are not coalesced: each caller runs its
/// own producer and the last `set` wins.
pub struct QueryCache<V> {
    config: CacheConfig,
    logger: Logger,
    store: Mutex<Store<V>>,
}

impl<V: Clone> QueryCache<V> {
    /// Create a cache with default settings
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with custom settings
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config: config.normalized(),
            logger: Logger::default(),
            store: Mutex::new(Store {
                entries: HashMap::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Route log messages to `logger`
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Effective configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry, refreshing its access time
    pub async fn get(&self, resource: &str, params: &JsonObject) -> Option<V> {
        let key = cache_key(resource, params);
        let now = Instant::now();
        let mut store = self.store.lock().await;

        let Some(entry) = store.entries.get_mut(&key) else {
            store.counters.misses += 1;
            return None;
        };
        if entry.is_expired_at(now) {
            store.entries.remove(&key);
            store.counters.expirations += 1;
            store.counters.misses += 1;
            return None;
        }

        entry.last_accessed = now;
        let value = entry.value.clone();
        store.counters.hits += 1;
        Some(value)
    }

    /// Store `value`, first sweeping expired entries and making room.
    ///
    /// `ttl_ms` overrides the configured lifetime; `None` or zero keeps it.
    pub async fn set(&self, resource: &str, params: &JsonObject, value: V, ttl_ms: Option<u64>) {
        let key = cache_key(resource, params);
        let ttl_ms = ttl_ms.filter(|&ms| ms > 0).unwrap_or(self.config.ttl_ms);
        let now = Instant::now();
        let mut store = self.store.lock().await;

        self.sweep_expired(&mut store, now);
        self.evict_if_full(&mut store);

        store
            .entries
            .insert(key, CacheEntry::new(value, now, Duration::from_millis(ttl_ms)));
    }

    /// Return the cached value, or run `producer` and cache what it yields.
    ///
    /// Producer errors propagate untouched and nothing is cached.
    pub async fn execute_with_cache<F, Fut, E>(
        &self,
        resource: &str,
        params: &JsonObject,
        producer: F,
        ttl_ms: Option<u64>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(resource, params).await {
            return Ok(value);
        }

        let value = producer().await?;
        self.set(resource, params, value.clone(), ttl_ms).await;
        Ok(value)
    }

    /// Entry for `resource` and `params` without touching counters or
    /// access time; expired entries are returned as they are
    pub async fn entry(&self, resource: &str, params: &JsonObject) -> Option<CacheEntry<V>> {
        let key = cache_key(resource, params);
        self.store.lock().await.entries.get(&key).cloned()
    }

    /// Remove one entry; returns whether it existed
    pub async fn invalidate(&self, resource: &str, params: &JsonObject) -> bool {
        let key = cache_key(resource, params);
        self.store.lock().await.entries.remove(&key).is_some()
    }

    /// Remove every entry
    pub async fn clear(&self) {
        let removed = {
            let mut store = self.store.lock().await;
            let removed = store.entries.len();
            store.entries.clear();
            removed
        };
        log_info!(self.logger, "Cleared cache ({removed} entries removed)");
    }

    /// Remove every entry of `resource_prefix`; an empty prefix clears all
    pub async fn clear_by_prefix(&self, resource_prefix: &str) {
        if resource_prefix.is_empty() {
            self.clear().await;
            return;
        }

        let prefix = format!("{resource_prefix}:");
        let removed = {
            let mut store = self.store.lock().await;
            let before = store.entries.len();
            store.entries.retain(|key, _| !key.starts_with(&prefix));
            before - store.entries.len()
        };
        log_info!(self.logger, "Cleared {removed} cache entries with prefix \"{resource_prefix}\"");
    }

    /// Number of stored entries, expired ones included until swept
    pub async fn len(&self) -> usize {
        self.store.lock().await.entries.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.entries.is_empty()
    }

    /// Counters and derived rates
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.lock().await;
        let counters = &store.counters;
        let size = store.entries.len();
        let lookups = counters.hits + counters.misses;

        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            expirations: counters.expirations,
            evictions: counters.evictions,
            size,
            max_size: self.config.max_size,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                counters.hits as f64 / lookups as f64 * 100.0
            },
            utilization_rate: size as f64 / self.config.max_size as f64 * 100.0,
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn sweep_expired(&self, store: &mut Store<V>, now: Instant) {
        let before = store.entries.len();
        store.entries.retain(|_, entry| !entry.is_expired_at(now));
        let expired = before - store.entries.len();

        if expired > 0 {
            store.counters.expirations += expired as u64;
            log_debug!(self.logger, "Cleaned up {expired} expired cache entries");
        }
    }

    fn evict_if_full(&self, store: &mut Store<V>) {
        if store.entries.len() < self.config.max_size {
            return;
        }

        let mut by_access: Vec<(Instant, String)> = store
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_accessed, key.clone()))
            .collect();
        by_access.sort_unstable();

        let evicted = self.config.eviction_count().min(by_access.len());
        for (_, key) in by_access.into_iter().take(evicted) {
            store.entries.remove(&key);
        }

        store.counters.evictions += evicted as u64;
        log_info!(self.logger, "Evicted {evicted} least recently used cache entries");
    }
}

impl<V: Clone> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
