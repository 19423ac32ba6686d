//! HTTP module
//!
//! A reqwest client with transport retries that can run every request
//! through a shared [`RateLimiter`](crate::rate_limit::RateLimiter), and a
//! [`PageFetcher`](crate::pagination::PageFetcher) built on it.
//!
//! # Features
//!
//! - **Transport Retries**: 5xx, timeouts and connection errors, with backoff
//! - **Backoff Strategies**: Constant, linear, and exponential backoff
//! - **Throttling**: 429 becomes `Error::RateLimited` for the rate limiter

mod client;
mod fetcher;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig};
pub use fetcher::HttpPageFetcher;

#[cfg(test)]
mod tests;
