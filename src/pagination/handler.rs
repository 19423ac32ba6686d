//! Pagination handler
//!
//! Drives a [`PageFetcher`] page by page until the source runs dry, either
//! strictly sequentially or in windows of concurrent fetches.

use super::types::{
    PageError, PageFetcher, PageParams, PageResult, PaginationConfig, PaginationStats,
};
use crate::logging::{log_debug, log_info, log_warn, Logger};
use crate::types::JsonObject;
use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Accumulators for one `fetch_all_pages*` run
#[derive(Debug)]
struct RunState<T> {
    current_page: u32,
    total_pages: u32,
    total_items: usize,
    all_data: Vec<T>,
    has_more_pages: bool,
    errors: Vec<PageError>,
    cancelled: bool,
}

impl<T> Default for RunState<T> {
    fn default() -> Self {
        Self {
            current_page: 0,
            total_pages: 0,
            total_items: 0,
            all_data: Vec::new(),
            has_more_pages: true,
            errors: Vec::new(),
            cancelled: false,
        }
    }
}

/// Collects every page a fetcher can produce into one flat list.
///
/// Fetch failures never reach the caller: a failed page is recorded and
/// treated as an empty last page, so the run ends early instead of
/// skipping a gap.
pub struct PaginationHandler<F: PageFetcher> {
    fetcher: F,
    config: PaginationConfig,
    logger: Logger,
    state: RunState<F::Item>,
}

impl<F: PageFetcher> PaginationHandler<F> {
    /// Create a handler with default settings
    pub fn new(fetcher: F) -> Self {
        Self::with_config(fetcher, PaginationConfig::default())
    }

    /// Create a handler with custom settings
    pub fn with_config(fetcher: F, config: PaginationConfig) -> Self {
        Self {
            fetcher,
            config: config.normalized(),
            logger: Logger::default(),
            state: RunState::default(),
        }
    }

    /// Route log messages to `logger`
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Effective configuration
    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// The wrapped fetcher
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch a single page, recording a failure instead of returning it
    pub async fn fetch_page(&mut self, page: u32, extra: &JsonObject) -> PageResult<F::Item> {
        let outcome = self.request_page(page, extra).await;
        self.absorb(outcome)
    }

    /// Fetch every page in order, one request at a time
    pub async fn fetch_all_pages(&mut self, extra: JsonObject) -> Vec<F::Item> {
        self.fetch_all_pages_with_cancel(extra, &CancellationToken::new())
            .await
    }

    /// Sequential fetch that stops early once `cancel` fires.
    ///
    /// Items collected before cancellation are returned and
    /// [`PaginationStats::cancelled`] is set.
    pub async fn fetch_all_pages_with_cancel(
        &mut self,
        extra: JsonObject,
        cancel: &CancellationToken,
    ) -> Vec<F::Item> {
        self.state = RunState::default();
        let start = Instant::now();
        log_info!(self.logger, "Starting pagination with page size {}", self.config.page_size);

        while self.state.has_more_pages && self.below_max_pages(self.state.current_page) {
            let page = self.state.current_page;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                outcome = self.request_page(page, &extra) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                self.mark_cancelled();
                break;
            };

            let page_data = self.absorb(outcome);
            self.state.has_more_pages = page_data.has_more;
            self.append(page_data.items);
            self.state.current_page += 1;
            self.state.total_pages += 1;

            if !self.state.has_more_pages {
                log_debug!(
                    self.logger,
                    "No more pages available after page {}",
                    self.state.current_page,
                );
                break;
            }
            if !self.below_max_pages(self.state.current_page) {
                log_info!(self.logger, "Reached maximum page limit of {}", self.state.current_page);
                break;
            }
        }

        self.log_summary("Pagination", start);
        std::mem::take(&mut self.state.all_data)
    }

    /// Fetch page 0, then the remaining pages in windows of `concurrency`
    pub async fn fetch_all_pages_concurrently(&mut self, extra: JsonObject) -> Vec<F::Item> {
        self.fetch_all_pages_concurrently_with_cancel(extra, &CancellationToken::new())
            .await
    }

    /// Concurrent fetch that stops early once `cancel` fires.
    ///
    /// Window results are appended in issue order, not completion order. A
    /// window containing a final (or failed) page ends the run; pages of
    /// that window issued after it are discarded.
    pub async fn fetch_all_pages_concurrently_with_cancel(
        &mut self,
        extra: JsonObject,
        cancel: &CancellationToken,
    ) -> Vec<F::Item> {
        self.state = RunState::default();
        let start = Instant::now();

        let first = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            outcome = self.request_page(0, &extra) => Some(outcome),
        };
        let Some(first) = first else {
            self.mark_cancelled();
            return Vec::new();
        };

        let first = self.absorb(first);
        let total_pages_hint = first.total_pages;
        self.state.has_more_pages = first.has_more;
        self.append(first.items);
        self.state.current_page = 1;
        self.state.total_pages = 1;

        if !self.state.has_more_pages {
            log_info!(self.logger, "Only one page of data available");
            return std::mem::take(&mut self.state.all_data);
        }

        let limit = self.page_limit(total_pages_hint);
        log_info!(
            self.logger,
            "Fetching additional pages concurrently with concurrency {}",
            self.config.concurrency,
        );

        let mut next_page: u32 = 1;
        while self.state.has_more_pages {
            let window: Vec<u32> = (next_page..)
                .take(self.config.concurrency)
                .take_while(|page| limit.map_or(true, |limit| u64::from(*page) < limit))
                .collect();
            if window.is_empty() {
                if total_pages_hint.is_some_and(|hint| u64::from(next_page) >= hint) {
                    // The server's page count is used up
                    self.state.has_more_pages = false;
                } else {
                    log_info!(self.logger, "Reached maximum page limit of {next_page}");
                }
                break;
            }
            next_page += window.len() as u32;

            let outcomes = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                outcomes = join_all(window.iter().map(|&page| self.request_page(page, &extra))) => {
                    Some(outcomes)
                }
            };
            let Some(outcomes) = outcomes else {
                self.mark_cancelled();
                break;
            };

            for outcome in outcomes {
                let page_data = self.absorb(outcome);
                if !self.state.has_more_pages {
                    continue;
                }
                self.state.has_more_pages = page_data.has_more;
                self.state.current_page = page_data.page + 1;
                self.state.total_pages += 1;
                self.append(page_data.items);
            }
        }

        self.log_summary("Concurrent pagination", start);
        std::mem::take(&mut self.state.all_data)
    }

    /// Snapshot of the last run
    pub fn stats(&self) -> PaginationStats {
        PaginationStats {
            total_items: self.state.total_items,
            total_pages: self.state.total_pages,
            page_size: self.config.page_size,
            has_more_pages: self.state.has_more_pages,
            errors: self.state.errors.len(),
            error_details: self.state.errors.clone(),
            cancelled: self.state.cancelled,
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn request_page(
        &self,
        page: u32,
        extra: &JsonObject,
    ) -> Result<PageResult<F::Item>, PageError> {
        let page_size = self.config.page_size;
        let params = PageParams {
            page,
            page_size,
            extra: extra.clone(),
        };

        log_debug!(self.logger, "Fetching page {} with page size {page_size}", page + 1);

        match self.fetcher.fetch(params).await {
            Ok(response) => Ok(response.into_page(page, page_size)),
            Err(e) => {
                let error = e.to_string();
                log_warn!(self.logger, "Error fetching page {}: {error}", page + 1);
                Err(PageError {
                    page,
                    error,
                    timestamp: Utc::now(),
                })
            }
        }
    }

    fn absorb(&mut self, outcome: Result<PageResult<F::Item>, PageError>) -> PageResult<F::Item> {
        match outcome {
            Ok(page) => page,
            Err(error) => {
                let page = PageResult::failed(error.page, self.config.page_size, &error.error);
                self.state.errors.push(error);
                page
            }
        }
    }

    fn append(&mut self, items: Vec<F::Item>) {
        self.state.total_items += items.len();
        self.state.all_data.extend(items);
    }

    fn below_max_pages(&self, page: u32) -> bool {
        self.config.max_pages.map_or(true, |max| page < max)
    }

    /// Exclusive upper bound on page indices for concurrent mode
    fn page_limit(&self, total_pages_hint: Option<u64>) -> Option<u64> {
        let max_pages = self.config.max_pages.map(u64::from);
        match (max_pages, total_pages_hint) {
            (Some(max), Some(hint)) => Some(max.min(hint)),
            (max, hint) => max.or(hint),
        }
    }

    fn mark_cancelled(&mut self) {
        self.state.cancelled = true;
        log_warn!(self.logger, "Pagination cancelled after {} pages", self.state.total_pages);
    }

    fn log_summary(&self, label: &str, start: Instant) {
        log_info!(
            self.logger,
            "{label} complete. Fetched {} items from {} pages in {:.2} seconds",
            self.state.total_items,
            self.state.total_pages,
            start.elapsed().as_secs_f64(),
        );
        if !self.state.errors.is_empty() {
            log_warn!(
                self.logger,
                "Encountered {} errors during pagination",
                self.state.errors.len(),
            );
        }
    }
}

impl<F: PageFetcher> std::fmt::Debug for PaginationHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationHandler")
            .field("config", &self.config)
            .field("total_items", &self.state.total_items)
            .field("total_pages", &self.state.total_pages)
            .finish_non_exhaustive()
    }
}
