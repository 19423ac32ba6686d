//! Batch processing module
//!
//! Runs a caller-supplied async function over every item of a list,
//! batch by batch, recording per-item failures instead of aborting.

mod processor;
mod types;

pub use processor::BatchProcessor;
pub use types::{BatchConfig, BatchOutcome, BatchStats, ItemError, DEFAULT_BATCH_SIZE};
