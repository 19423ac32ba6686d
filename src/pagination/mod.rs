//! Pagination module
//!
//! Repeatedly calls a caller-supplied page fetcher until the source is
//! exhausted and accumulates one flat, ordered result list.
//!
//! # Overview
//!
//! - `PageFetcher` - the seam; any `Fn(PageParams) -> Future` closure qualifies
//! - `PageResponse` - the closed set of response shapes a fetcher may return
//! - `PaginationHandler` - sequential and windowed-concurrent page drivers
//! - `PaginationStats` - per-run counters and recorded page failures

mod handler;
mod types;

pub use handler::PaginationHandler;
pub use types::{
    PageError, PageFetcher, PageParams, PageResponse, PageResult, PaginationConfig,
    PaginationInfo, PaginationStats, DEFAULT_PAGE_SIZE,
};
