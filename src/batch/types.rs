//! Batch processing configuration, records and statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of items per batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`BatchProcessor`](super::BatchProcessor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per batch; the last batch may be shorter
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches run at once within a window
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Keep going inside a batch after an item fails
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_concurrency() -> usize {
    1
}

fn default_continue_on_error() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 1,
            continue_on_error: true,
        }
    }
}

impl BatchConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set how many batches run at once
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Stop a batch at its first failure when `false`
    #[must_use]
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Replace zero batch size and concurrency with defaults
    pub(crate) fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.concurrency == 0 {
            self.concurrency = 1;
        }
        self
    }
}

// ============================================================================
// Records
// ============================================================================

/// One failed item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError<T> {
    pub item: T,
    /// Position of the item in the full input
    pub item_index: usize,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// What one batch did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome<T> {
    pub batch_index: usize,
    pub total_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub errors: Vec<ItemError<T>>,
    /// Cancellation stopped the batch before its last item
    pub interrupted: bool,
}

impl<T> BatchOutcome<T> {
    pub(crate) fn new(batch_index: usize, total_items: usize) -> Self {
        Self {
            batch_index,
            total_items,
            successful_items: 0,
            failed_items: 0,
            errors: Vec::new(),
            interrupted: false,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for the current or last `process_all` run plus derived rates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStats<T> {
    pub total_items: usize,
    /// Items whose processing function succeeded
    pub processed_items: usize,
    pub failed_items: usize,
    pub total_batches: usize,
    /// Batches with no failed item
    pub successful_batches: usize,
    pub failed_batches: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub errors: Vec<ItemError<T>>,
    /// Seconds from start to finish, or to now while running
    pub duration_secs: f64,
    /// Zero when no time has passed
    pub items_per_second: f64,
    /// `processed_items / total_items` as a percentage
    pub success_rate: f64,
    /// `successful_batches / total_batches` as a percentage
    pub batch_success_rate: f64,
    pub cancelled: bool,
}

/// `part / whole * 100`, or zero for an empty whole
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
