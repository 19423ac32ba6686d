//! Rate limiter configuration, options and error classification

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Backoff applied to the first rate-limited retry; doubles afterwards
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

/// Fraction of bucket capacity below which priority calls are throttled
pub(crate) const PRIORITY_THRESHOLD: f64 = 0.25;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`RateLimiter`](super::RateLimiter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Bucket capacity: requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window over which a full bucket refills
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: u64,
    /// Extra delay after taking a token
    #[serde(default)]
    pub min_delay_ms: u64,
    /// Backoff baseline, restored after every success
    #[serde(default = "default_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Retries for rate-limited calls when the caller does not say
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_max_requests() -> u32 {
    60
}

fn default_time_window_ms() -> u64 {
    60_000
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

fn default_retries() -> u32 {
    3
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            time_window_ms: default_time_window_ms(),
            min_delay_ms: 0,
            base_backoff_ms: DEFAULT_BACKOFF_MS,
            retries: default_retries(),
        }
    }
}

impl RateLimiterConfig {
    /// Create a config allowing `max_requests` per `time_window_ms`
    pub fn new(max_requests: u32, time_window_ms: u64) -> Self {
        Self {
            max_requests,
            time_window_ms,
            ..Self::default()
        }
    }

    /// `n` requests per second
    pub fn per_second(n: u32) -> Self {
        Self::new(n, 1_000)
    }

    /// `n` requests per minute
    pub fn per_minute(n: u32) -> Self {
        Self::new(n, 60_000)
    }

    /// Set the minimum delay after each token
    #[must_use]
    pub fn with_min_delay_ms(mut self, ms: u64) -> Self {
        self.min_delay_ms = ms;
        self
    }

    /// Set the backoff baseline
    #[must_use]
    pub fn with_base_backoff_ms(mut self, ms: u64) -> Self {
        self.base_backoff_ms = ms;
        self
    }

    /// Set the default retry count
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Replace zero capacity, window and backoff with defaults
    pub(crate) fn normalized(mut self) -> Self {
        if self.max_requests == 0 {
            self.max_requests = default_max_requests();
        }
        if self.time_window_ms == 0 {
            self.time_window_ms = default_time_window_ms();
        }
        if self.base_backoff_ms == 0 {
            self.base_backoff_ms = DEFAULT_BACKOFF_MS;
        }
        self
    }
}

// ============================================================================
// Per-call Options
// ============================================================================

/// Options for a single `execute` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Skip the token wait unless the bucket is below 25% capacity
    pub priority: bool,
    /// Retries for rate-limited failures (`None` = limiter default)
    pub retries: Option<u32>,
}

impl ExecuteOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// High-priority call
    pub fn priority() -> Self {
        Self {
            priority: true,
            retries: None,
        }
    }

    /// Set the retry count
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

// ============================================================================
// Status
// ============================================================================

/// Snapshot of limiter state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub available_tokens: f64,
    pub max_tokens: u32,
    /// Requests started within the trailing window
    pub requests_in_window: usize,
    pub rate_limit_errors: u64,
    pub current_backoff_ms: u64,
    pub time_window_ms: u64,
}

// ============================================================================
// Error Classification
// ============================================================================

/// What the limiter can learn from a failure: its message and, when the
/// error came from HTTP, a status code.
pub trait RetrySignal: fmt::Display {
    /// HTTP status carried by the error, if any
    fn status_code(&self) -> Option<u16> {
        None
    }
}

impl RetrySignal for Error {
    fn status_code(&self) -> Option<u16> {
        Error::status_code(self)
    }
}

impl RetrySignal for reqwest::Error {
    fn status_code(&self) -> Option<u16> {
        self.status().map(|s| s.as_u16())
    }
}

impl RetrySignal for anyhow::Error {
    fn status_code(&self) -> Option<u16> {
        if let Some(err) = self.downcast_ref::<Error>() {
            return err.status_code();
        }
        self.downcast_ref::<reqwest::Error>()
            .and_then(reqwest::Error::status)
            .map(|s| s.as_u16())
    }
}

impl RetrySignal for String {}

impl RetrySignal for &str {}

/// Caller-supplied test for "this failure means slow down"
pub type RetryClassifier = Arc<dyn Fn(&dyn RetrySignal) -> bool + Send + Sync>;

/// Default classifier: status 429, or a message containing "rate limit" or
/// "too many requests" (case-sensitive).
pub fn is_rate_limit_signal(err: &dyn RetrySignal) -> bool {
    if err.status_code() == Some(429) {
        return true;
    }
    let message = err.to_string();
    message.contains("rate limit") || message.contains("too many requests")
}

/// Failure of a cancellable `execute`
#[derive(Debug)]
pub enum ExecuteError<E> {
    /// The cancellation token fired first
    Cancelled,
    /// The wrapped operation failed; the error is returned untouched
    Failed(E),
}

impl<E> ExecuteError<E> {
    /// Whether the call was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The operation's own error, if that is what stopped the call
    pub fn into_failed(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ExecuteError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("Operation cancelled"),
            Self::Failed(e) => e.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ExecuteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cancelled => None,
            Self::Failed(e) => Some(e),
        }
    }
}

impl From<ExecuteError<Error>> for Error {
    fn from(err: ExecuteError<Error>) -> Self {
        match err {
            ExecuteError::Cancelled => Error::Cancelled,
            ExecuteError::Failed(e) => e,
        }
    }
}
