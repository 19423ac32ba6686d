//! Rate limiting module
//!
//! Throttles caller-supplied operations with a continuously refilling token
//! bucket and retries throttled failures with exponential backoff.
//!
//! # Features
//!
//! - **Token Bucket**: capacity `max_requests`, refilled over `time_window_ms`
//! - **Priority Calls**: bypass the bucket until it drops below 25%
//! - **Backoff**: doubling delay on rate-limit failures, reset on success
//! - **Pluggable Classification**: 429 / message heuristic by default

mod limiter;
mod types;

pub use limiter::RateLimiter;
pub use types::{
    is_rate_limit_signal, ExecuteError, ExecuteOptions, RateLimitStatus, RateLimiterConfig,
    RetryClassifier, RetrySignal, DEFAULT_BACKOFF_MS,
};
