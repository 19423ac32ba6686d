// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::needless_pass_by_value)]

//! # bulksync
//!
//! Building blocks for bulk data synchronisation against third-party APIs.
//!
//! ## Components
//!
//! - **Pagination**: drain a paged source sequentially or in concurrent windows
//! - **Rate Limiting**: continuous token bucket with rate-limit-aware backoff
//! - **Batch Processing**: bounded-concurrency batches with per-item failure records
//! - **Query Cache**: TTL cache with approximate LRU eviction
//!
//! The components never call each other; an integrator composes them, for
//! example by running each page fetch through a shared rate limiter.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulksync::pagination::{PageParams, PageResponse, PaginationHandler};
//! use bulksync::rate_limit::{ExecuteOptions, RateLimiter};
//!
//! let limiter = RateLimiter::default();
//! let mut handler = PaginationHandler::new(|params: PageParams| {
//!     let limiter = &limiter;
//!     async move {
//!         limiter
//!             .execute(|| fetch_clients(params.clone()), ExecuteOptions::new())
//!             .await
//!             .map(PageResponse::data)
//!     }
//! });
//! let clients = handler.fetch_all_pages(Default::default()).await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 CLI (fetch / push / config)                  │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────┬──────────────┬─┴────────────┬─────────────────┐
//! │ Pagination  │ Rate Limit   │ Batch        │ Query Cache     │
//! ├─────────────┼──────────────┼──────────────┼─────────────────┤
//! │ Sequential  │ Token bucket │ Windows      │ TTL             │
//! │ Windowed    │ Priority     │ Item errors  │ LRU-ish evict   │
//! │ Shapes      │ 429 backoff  │ Rates        │ Prefix clear    │
//! └─────────────┴──────────────┴──────────────┴─────────────────┘
//!                                │
//!                   HTTP client + page fetcher
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Logging sink shared by the components
pub mod logging;

/// Settings loading
pub mod config;

/// Page-by-page fetching
pub mod pagination;

/// Token bucket rate limiting
pub mod rate_limit;

/// Batched item processing
pub mod batch;

/// Result caching
pub mod cache;

/// HTTP client and page fetcher
pub mod http;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use batch::{BatchConfig, BatchProcessor, BatchStats};
pub use cache::{CacheConfig, QueryCache};
pub use config::Settings;
pub use logging::Logger;
pub use pagination::{PageFetcher, PageParams, PageResponse, PaginationConfig, PaginationHandler};
pub use rate_limit::{ExecuteOptions, RateLimiter, RateLimiterConfig};
pub use tokio_util::sync::CancellationToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
