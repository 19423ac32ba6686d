//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bulk data sync toolkit: paginate, rate limit, batch
#[derive(Parser, Debug)]
#[command(name = "bulksync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every page of an endpoint and print the records
    Fetch {
        /// Endpoint path (relative to the configured base URL) or full URL
        #[arg(long)]
        url: String,

        /// Extra query parameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Fetch pages in concurrent windows
        #[arg(long)]
        concurrent: bool,

        /// Override the page size
        #[arg(long)]
        page_size: Option<u32>,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// POST every record of a file to an endpoint in batches
    Push {
        /// Endpoint path (relative to the configured base URL) or full URL
        #[arg(long)]
        url: String,

        /// JSON array or JSON lines file
        #[arg(short, long)]
        input: PathBuf,

        /// Override the batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Print the effective settings as YAML
    Config,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON record per line
    Json,
    /// A single indented JSON array
    Pretty,
}
