//! Cache configuration, entries and statistics

use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Default entry lifetime: five minutes
pub const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;

/// Default capacity
pub const DEFAULT_MAX_SIZE: usize = 1000;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`QueryCache`](super::QueryCache)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of an entry unless `set` overrides it
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Entry count that triggers eviction
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

fn default_max_size() -> usize {
    DEFAULT_MAX_SIZE
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl CacheConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry lifetime
    #[must_use]
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Set the capacity
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.ttl_ms == 0 {
            self.ttl_ms = DEFAULT_TTL_MS;
        }
        if self.max_size == 0 {
            self.max_size = DEFAULT_MAX_SIZE;
        }
        self
    }

    /// Entries removed per eviction pass: `ceil(max_size / 10)`
    pub(crate) fn eviction_count(&self) -> usize {
        self.max_size.div_ceil(10)
    }
}

// ============================================================================
// Entries
// ============================================================================

/// A cached value and its timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    /// Refreshed on every hit
    pub last_accessed: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, now: Instant, ttl: std::time::Duration) -> Self {
        Self {
            value,
            created_at: now,
            last_accessed: now,
            expires_at: now + ttl,
        }
    }

    /// Strictly past its expiry time
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Key for `resource` and `params`: `"<resource>:<params as JSON>"` with
/// the parameter keys in sorted order, so insertion order never matters.
pub fn cache_key(resource: &str, params: &JsonObject) -> String {
    let mut pairs: Vec<(&String, &JsonValue)> = params.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let sorted: JsonObject = pairs
        .into_iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    format!("{resource}:{}", JsonValue::Object(sorted))
}

// ============================================================================
// Statistics
// ============================================================================

/// Cache counters plus derived rates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
    /// Current entry count
    pub size: usize,
    pub max_size: usize,
    /// `hits / (hits + misses)` as a percentage
    pub hit_rate: f64,
    /// `size / max_size` as a percentage
    pub utilization_rate: f64,
}
