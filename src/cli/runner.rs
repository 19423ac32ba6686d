//! CLI runner - executes commands

use crate::batch::BatchProcessor;
use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::Settings;
use crate::error::{Error, Result, ResultExt};
use crate::http::{HttpClient, HttpPageFetcher};
use crate::pagination::PaginationHandler;
use crate::rate_limit::RateLimiter;
use crate::types::{JsonObject, JsonValue, LogLevel};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
    settings: Settings,
}

impl Runner {
    /// Create a runner, resolving settings from file, environment and flags
    pub fn new(cli: Cli) -> Result<Self> {
        let mut settings = match &cli.settings {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        settings.apply_env()?;
        if cli.verbose {
            settings.log_level = LogLevel::Debug;
        }
        settings.validate()?;

        Ok(Self { cli, settings })
    }

    /// Effective settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Level the binary should log at
    pub fn log_level(&self) -> LogLevel {
        self.settings.log_level
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Fetch {
                url,
                params,
                concurrent,
                page_size,
                max_pages,
                format,
            } => {
                let extra = parse_params(params.as_deref())?;
                self.fetch(url, extra, *concurrent, *page_size, *max_pages, *format)
                    .await
            }
            Commands::Push {
                url,
                input,
                batch_size,
            } => self.push(url, input, *batch_size).await,
            Commands::Config => self.show_config(),
        }
    }

    /// Paginate `url` and print every record
    async fn fetch(
        &self,
        url: &str,
        extra: JsonObject,
        concurrent: bool,
        page_size: Option<u32>,
        max_pages: Option<u32>,
        format: OutputFormat,
    ) -> Result<()> {
        let mut config = self.settings.pagination.clone();
        if let Some(page_size) = page_size {
            config.page_size = page_size;
        }
        if max_pages.is_some() {
            config.max_pages = max_pages;
        }

        let fetcher = HttpPageFetcher::new(Arc::new(self.build_client()?), url);
        let mut handler = PaginationHandler::with_config(fetcher, config);
        let cancel = cancel_on_ctrl_c();

        info!("Fetching {url}");
        let records = if concurrent {
            handler
                .fetch_all_pages_concurrently_with_cancel(extra, &cancel)
                .await
        } else {
            handler.fetch_all_pages_with_cancel(extra, &cancel).await
        };

        let mut out = std::io::stdout().lock();
        match format {
            OutputFormat::Json => {
                for record in &records {
                    writeln!(out, "{}", serde_json::to_string(record)?)?;
                }
            }
            OutputFormat::Pretty => {
                writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
            }
        }

        let stats = handler.stats();
        eprintln!("{}", serde_json::to_string(&stats)?);
        if stats.cancelled {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// POST every record of `input` to `url`
    async fn push(&self, url: &str, input: &Path, batch_size: Option<usize>) -> Result<()> {
        let content = fs::read_to_string(input)
            .with_context(|| format!("Failed to read input file '{}'", input.display()))?;
        let records = parse_records(&content)?;
        debug!("Loaded {} records from {}", records.len(), input.display());

        let mut config = self.settings.batch.clone();
        if let Some(batch_size) = batch_size {
            config.batch_size = batch_size;
        }

        let client = self.build_client()?;
        let client = &client;
        let mut processor = BatchProcessor::with_config(config);
        let cancel = cancel_on_ctrl_c();

        let stats = processor
            .process_all_with_cancel(
                &records,
                move |record, _index| async move { client.post_json(url, record).await.map(drop) },
                &cancel,
            )
            .await;

        println!("{}", serde_json::to_string_pretty(&stats)?);
        if stats.cancelled {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Print the effective settings
    fn show_config(&self) -> Result<()> {
        print!("{}", self.settings.to_yaml()?);
        Ok(())
    }

    /// HTTP client sharing one rate limiter across all its requests
    fn build_client(&self) -> Result<HttpClient> {
        let limiter = RateLimiter::new(self.settings.rate_limit.clone());
        Ok(HttpClient::with_config(self.settings.http.clone())?.with_rate_limiter(Arc::new(limiter)))
    }
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

/// Parse `--params`, which must be a JSON object
fn parse_params(raw: Option<&str>) -> Result<JsonObject> {
    let Some(raw) = raw else {
        return Ok(JsonObject::new());
    };
    match serde_json::from_str(raw)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(Error::invalid_value(
            "params",
            format!("expected a JSON object, got {other}"),
        )),
    }
}

/// Records from a JSON array or a JSON lines document
fn parse_records(content: &str) -> Result<Vec<JsonValue>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}
