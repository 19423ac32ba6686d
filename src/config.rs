//! Settings for all components
//!
//! One file (YAML or JSON) configures every component, and a handful of
//! `SYNC_*` environment variables override it:
//!
//! ```yaml
//! log_level: info
//! pagination:
//!   page_size: 100
//!   concurrency: 3
//! rate_limit:
//!   max_requests: 60
//!   time_window_ms: 60000
//! batch:
//!   batch_size: 50
//! cache:
//!   ttl_ms: 300000
//! http:
//!   base_url: https://api.example.com
//! ```

use crate::batch::BatchConfig;
use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use crate::http::HttpClientConfig;
use crate::pagination::PaginationConfig;
use crate::rate_limit::RateLimiterConfig;
use crate::types::LogLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Batch size override
pub const ENV_BATCH_SIZE: &str = "SYNC_BATCH_SIZE";
/// Rate-limit retry count override
pub const ENV_RETRY_ATTEMPTS: &str = "SYNC_RETRY_ATTEMPTS";
/// Base rate-limit backoff override, in milliseconds
pub const ENV_RETRY_DELAY: &str = "SYNC_RETRY_DELAY";
/// Page size override
pub const ENV_PAGE_SIZE: &str = "SYNC_PAGE_SIZE";
/// Concurrency override for pagination and batches
pub const ENV_CONCURRENCY: &str = "SYNC_CONCURRENCY";
/// Log level override
pub const ENV_LOG_LEVEL: &str = "SYNC_LOG_LEVEL";

/// Complete settings, every section optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub rate_limit: RateLimiterConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
}

impl Settings {
    /// Load settings from a `.yaml`, `.yml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(Error::config(format!(
                "Unsupported settings file '{}': expected .yaml, .yml or .json",
                path.display()
            ))),
        }
    }

    /// Parse YAML settings
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse JSON settings
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Overlay the `SYNC_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`, keyed by the `SYNC_*` variable names
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = parse_var::<usize>(&lookup, ENV_BATCH_SIZE)? {
            self.batch.batch_size = value;
        }
        if let Some(value) = parse_var::<u32>(&lookup, ENV_RETRY_ATTEMPTS)? {
            self.rate_limit.retries = value;
        }
        if let Some(value) = parse_var::<u64>(&lookup, ENV_RETRY_DELAY)? {
            self.rate_limit.base_backoff_ms = value;
        }
        if let Some(value) = parse_var::<u32>(&lookup, ENV_PAGE_SIZE)? {
            self.pagination.page_size = value;
        }
        if let Some(value) = parse_var::<usize>(&lookup, ENV_CONCURRENCY)? {
            self.pagination.concurrency = value;
            self.batch.concurrency = value;
        }
        if let Some(value) = parse_var::<LogLevel>(&lookup, ENV_LOG_LEVEL)? {
            self.log_level = value;
        }
        Ok(())
    }

    /// Check values that would otherwise fail later
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.http.base_url {
            url::Url::parse(base_url)?;
        }
        if self.rate_limit.time_window_ms == 0 {
            return Err(Error::invalid_value(
                "rate_limit.time_window_ms",
                "must be greater than zero",
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(Error::invalid_value(
                "rate_limit.max_requests",
                "must be greater than zero",
            ));
        }
        if self.http.timeout_ms == 0 {
            return Err(Error::invalid_value(
                "http.timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| Error::invalid_value(name, format!("cannot parse '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let settings = Settings::from_yaml_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.pagination.page_size, 50);
        assert_eq!(settings.batch.batch_size, 50);
        assert_eq!(settings.cache.max_size, 1000);
        assert_eq!(settings.log_level, LogLevel::Info);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "log_level: debug\npagination:\n  page_size: 100\n  max_pages: 5\nrate_limit:\n  max_requests: 10\n  time_window_ms: 1000\nhttp:\n  base_url: https://api.example.com\n"
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.pagination.page_size, 100);
        assert_eq!(settings.pagination.max_pages, Some(5));
        assert_eq!(settings.rate_limit.max_requests, 10);
        assert_eq!(settings.rate_limit.time_window_ms, 1000);
        assert_eq!(
            settings.http.base_url.as_deref(),
            Some("https://api.example.com")
        );
        settings.validate().unwrap();
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"batch": {{"batch_size": 25, "continue_on_error": false}}, "cache": {{"ttl_ms": 1000}}}}"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.batch.batch_size, 25);
        assert!(!settings.batch.continue_on_error);
        assert_eq!(settings.cache.ttl_ms, 1000);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = Settings::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Settings::load("/nonexistent/bulksync.yaml").unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = Settings::from_yaml_str("pagination: [1, 2").unwrap_err();
        assert!(matches!(err, Error::YamlParse(_)));
    }

    #[test]
    fn test_overrides_apply() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup(&[
                (ENV_BATCH_SIZE, "20"),
                (ENV_RETRY_ATTEMPTS, "5"),
                (ENV_RETRY_DELAY, "250"),
                (ENV_PAGE_SIZE, "200"),
                (ENV_CONCURRENCY, "4"),
                (ENV_LOG_LEVEL, "warn"),
            ]))
            .unwrap();

        assert_eq!(settings.batch.batch_size, 20);
        assert_eq!(settings.rate_limit.retries, 5);
        assert_eq!(settings.rate_limit.base_backoff_ms, 250);
        assert_eq!(settings.pagination.page_size, 200);
        assert_eq!(settings.pagination.concurrency, 4);
        assert_eq!(settings.batch.concurrency, 4);
        assert_eq!(settings.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_overrides_ignore_blank_and_reject_garbage() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup(&[(ENV_BATCH_SIZE, "  ")]))
            .unwrap();
        assert_eq!(settings.batch.batch_size, 50);

        let err = settings
            .apply_overrides(lookup(&[(ENV_PAGE_SIZE, "lots")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid config value for 'SYNC_PAGE_SIZE': cannot parse 'lots'"
        );
    }

    #[test]
    fn test_validate() {
        let mut settings = Settings::default();
        settings.validate().unwrap();

        settings.http.base_url = Some("not a url".into());
        assert!(matches!(settings.validate(), Err(Error::InvalidUrl(_))));

        settings.http.base_url = None;
        settings.rate_limit.time_window_ms = 0;
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_yaml_round_trip_for_config_command() {
        let mut settings = Settings::default();
        settings.pagination.page_size = 75;
        let yaml = settings.to_yaml().unwrap();
        assert!(yaml.contains("page_size: 75"));
        assert_eq!(Settings::from_yaml_str(&yaml).unwrap(), settings);
    }
}
