//! CLI module
//!
//! Command-line interface over the components.
//!
//! # Commands
//!
//! - `fetch` - Paginate an endpoint under the rate limiter
//! - `push` - POST records from a file through the batch processor
//! - `config` - Show the effective settings

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
