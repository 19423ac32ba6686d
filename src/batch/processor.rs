//! Batch processor
//!
//! Splits the input into fixed-size batches and runs them in windows of
//! `concurrency`. Each batch walks its items in order; a window finishes
//! completely before the next one starts.

use super::types::{percentage, BatchConfig, BatchOutcome, BatchStats, ItemError};
use crate::logging::{log_debug, log_info, log_warn, Logger};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt::Display;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Accumulators for one `process_all*` run
#[derive(Debug)]
struct RunState<T> {
    total_items: usize,
    processed_items: usize,
    failed_items: usize,
    total_batches: usize,
    successful_batches: usize,
    failed_batches: usize,
    started: Option<(Instant, DateTime<Utc>)>,
    finished: Option<(Instant, DateTime<Utc>)>,
    errors: Vec<ItemError<T>>,
    cancelled: bool,
}

impl<T> Default for RunState<T> {
    fn default() -> Self {
        Self {
            total_items: 0,
            processed_items: 0,
            failed_items: 0,
            total_batches: 0,
            successful_batches: 0,
            failed_batches: 0,
            started: None,
            finished: None,
            errors: Vec::new(),
            cancelled: false,
        }
    }
}

/// Drives a per-item processing function across batches of items.
///
/// Item failures never escape: each one becomes an [`ItemError`] in the
/// run's [`BatchStats`].
pub struct BatchProcessor<T> {
    config: BatchConfig,
    logger: Logger,
    state: RunState<T>,
}

impl<T: Clone> BatchProcessor<T> {
    /// Create a processor with default settings
    pub fn new() -> Self {
        Self::with_config(BatchConfig::default())
    }

    /// Create a processor with custom settings
    pub fn with_config(config: BatchConfig) -> Self {
        Self {
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
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every item and return the run's stats.
    ///
    /// `process_fn` receives a clone of the item and its index in `items`,
    /// which stays the same whatever the concurrency.
    pub async fn process_all<F, Fut, E>(&mut self, items: &[T], process_fn: F) -> BatchStats<T>
    where
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        self.process_all_with_cancel(items, process_fn, &CancellationToken::new())
            .await
    }

    /// Like [`process_all`](Self::process_all), stopping before the next
    /// item of every running batch once `cancel` fires.
    ///
    /// Counts gathered so far are kept and [`BatchStats::cancelled`] is set.
    pub async fn process_all_with_cancel<F, Fut, E>(
        &mut self,
        items: &[T],
        process_fn: F,
        cancel: &CancellationToken,
    ) -> BatchStats<T>
    where
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let batch_size = self.config.batch_size;
        let concurrency = self.config.concurrency;
        let batches: Vec<&[T]> = items.chunks(batch_size).collect();

        self.state = RunState {
            total_items: items.len(),
            total_batches: batches.len(),
            started: Some((Instant::now(), Utc::now())),
            ..RunState::default()
        };
        log_info!(
            self.logger,
            "Starting batch processing of {} items with batch size {batch_size} and concurrency {concurrency}",
            items.len(),
        );

        for (window_index, window) in batches.chunks(concurrency).enumerate() {
            let first_batch = window_index * concurrency;
            let outcomes = join_all(window.iter().enumerate().map(|(offset, batch)| {
                self.process_batch(batch, first_batch + offset, &process_fn, cancel)
            }))
            .await;

            let interrupted = outcomes.iter().any(|outcome| outcome.interrupted);
            for outcome in outcomes {
                self.fold(outcome);
            }
            if interrupted || cancel.is_cancelled() {
                self.state.cancelled = true;
                log_warn!(
                    self.logger,
                    "Batch processing cancelled after {} items",
                    self.state.processed_items + self.state.failed_items,
                );
                break;
            }
        }

        self.state.finished = Some((Instant::now(), Utc::now()));
        let stats = self.stats();
        log_info!(
            self.logger,
            "Batch processing complete. Processed {} items successfully and {} items failed in {:.2} seconds",
            stats.processed_items,
            stats.failed_items,
            stats.duration_secs,
        );
        stats
    }

    /// Stats of the current or last run
    pub fn stats(&self) -> BatchStats<T> {
        let state = &self.state;
        let duration_secs = match (state.started, state.finished) {
            (Some((start, _)), Some((end, _))) => end.duration_since(start).as_secs_f64(),
            (Some((start, _)), None) => start.elapsed().as_secs_f64(),
            (None, _) => 0.0,
        };
        let items_per_second = if duration_secs > 0.0 {
            state.processed_items as f64 / duration_secs
        } else {
            0.0
        };

        BatchStats {
            total_items: state.total_items,
            processed_items: state.processed_items,
            failed_items: state.failed_items,
            total_batches: state.total_batches,
            successful_batches: state.successful_batches,
            failed_batches: state.failed_batches,
            started_at: state.started.map(|(_, at)| at),
            finished_at: state.finished.map(|(_, at)| at),
            errors: state.errors.clone(),
            duration_secs,
            items_per_second,
            success_rate: percentage(state.processed_items, state.total_items),
            batch_success_rate: percentage(state.successful_batches, state.total_batches),
            cancelled: state.cancelled,
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn process_batch<F, Fut, E>(
        &self,
        batch: &[T],
        batch_index: usize,
        process_fn: &F,
        cancel: &CancellationToken,
    ) -> BatchOutcome<T>
    where
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let mut outcome = BatchOutcome::new(batch_index, batch.len());
        log_debug!(self.logger, "Processing batch {} with {} items", batch_index + 1, batch.len());

        for (offset, item) in batch.iter().enumerate() {
            let item_index = batch_index * self.config.batch_size + offset;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.interrupted = true;
                    break;
                }
                result = process_fn(item.clone(), item_index) => result,
            };

            match result {
                Ok(()) => outcome.successful_items += 1,
                Err(e) => {
                    let error = e.to_string();
                    log_warn!(self.logger, "Error processing item {item_index}: {error}");
                    outcome.failed_items += 1;
                    outcome.errors.push(ItemError {
                        item: item.clone(),
                        item_index,
                        error,
                        timestamp: Utc::now(),
                    });

                    if !self.config.continue_on_error {
                        log_info!(self.logger, "Stopping batch {} due to error", batch_index + 1);
                        break;
                    }
                }
            }
        }

        outcome
    }

    /// A batch cut short by cancellation without failures counts as neither
    fn fold(&mut self, outcome: BatchOutcome<T>) {
        self.state.processed_items += outcome.successful_items;
        self.state.failed_items += outcome.failed_items;
        if outcome.failed_items > 0 {
            self.state.failed_batches += 1;
            self.state.errors.extend(outcome.errors);
        } else if !outcome.interrupted {
            self.state.successful_batches += 1;
        }
    }
}

impl<T: Clone> Default for BatchProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BatchProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("config", &self.config)
            .field("processed_items", &self.state.processed_items)
            .field("failed_items", &self.state.failed_items)
            .finish_non_exhaustive()
    }
}
