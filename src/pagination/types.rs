//! Pagination types and traits
//!
//! Defines the response shapes a page fetcher may return, the uniform page
//! result they normalize into, and the fetcher seam itself.

use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::future::Future;

/// Default number of items requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`PaginationHandler`](super::PaginationHandler)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Items requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Pages fetched at once in concurrent mode
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound on pages fetched per run (`None` = unbounded)
    #[serde(default)]
    pub max_pages: Option<u32>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_concurrency() -> usize {
    1
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: 1,
            max_pages: None,
        }
    }
}

impl PaginationConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the concurrency used by concurrent mode
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Cap the number of pages per run
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Replace zero values with their defaults.
    ///
    /// A zero `max_pages` means unbounded.
    pub(crate) fn normalized(mut self) -> Self {
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        if self.concurrency == 0 {
            self.concurrency = 1;
        }
        if self.max_pages == Some(0) {
            self.max_pages = None;
        }
        self
    }
}

// ============================================================================
// Request Parameters
// ============================================================================

/// Parameters handed to the page fetcher for one request
#[derive(Debug, Clone, PartialEq)]
pub struct PageParams {
    /// Zero-based page index
    pub page: u32,
    /// Items requested per page
    pub page_size: u32,
    /// Caller-supplied parameters, passed through on every page
    pub extra: JsonObject,
}

impl PageParams {
    /// Create params for a page with no extra parameters
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            extra: JsonObject::new(),
        }
    }

    /// Flatten into `{page_size, page, ...extra}`; extra keys win.
    pub fn to_map(&self) -> JsonObject {
        let mut map = JsonObject::new();
        map.insert("page_size".to_string(), JsonValue::from(self.page_size));
        map.insert("page".to_string(), JsonValue::from(self.page));
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    /// Render as string query pairs for an HTTP request
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.to_map()
            .into_iter()
            .map(|(key, value)| {
                let rendered = match value {
                    JsonValue::String(s) => s,
                    JsonValue::Null => String::new(),
                    other => other.to_string(),
                };
                (key, rendered)
            })
            .collect()
    }
}

// ============================================================================
// Response Shapes
// ============================================================================

/// Pagination metadata some APIs nest under a `pagination` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub has_more: Option<bool>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_pages: Option<u64>,
}

/// The page-like responses a fetcher may return.
///
/// Deserializes from JSON by shape: a bare array, an object with a `data`
/// array, an object with an `items` array, or anything else (an empty page).
/// Hint fields of an unexpected type never cost the records: `has_more` is
/// read by truthiness and an unusable page count is dropped.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PageResponse<T> {
    /// A bare array of records
    Bare(Vec<T>),
    /// `{ "data": [...] }`
    Data {
        data: Vec<T>,
        #[serde(default, deserialize_with = "lenient_flag")]
        has_more: Option<bool>,
        #[serde(default, deserialize_with = "lenient_count")]
        total_pages: Option<u64>,
        #[serde(default, deserialize_with = "lenient_pagination")]
        pagination: Option<PaginationInfo>,
    },
    /// `{ "items": [...] }`
    Items {
        items: Vec<T>,
        #[serde(default, deserialize_with = "lenient_flag")]
        has_more: Option<bool>,
        #[serde(default, deserialize_with = "lenient_count")]
        total_pages: Option<u64>,
        #[serde(default, deserialize_with = "lenient_pagination")]
        pagination: Option<PaginationInfo>,
    },
    /// Any other payload; treated as an empty, final page
    Unrecognized(IgnoredAny),
}

impl<T> PageResponse<T> {
    /// A bare array response
    pub fn bare(items: Vec<T>) -> Self {
        Self::Bare(items)
    }

    /// A `{data: [...]}` response without pagination hints
    pub fn data(items: Vec<T>) -> Self {
        Self::Data {
            data: items,
            has_more: None,
            total_pages: None,
            pagination: None,
        }
    }

    /// An `{items: [...]}` response without pagination hints
    pub fn items(items: Vec<T>) -> Self {
        Self::Items {
            items,
            has_more: None,
            total_pages: None,
            pagination: None,
        }
    }

    /// Set an explicit top-level `has_more`. No effect on bare arrays.
    #[must_use]
    pub fn with_has_more(mut self, value: bool) -> Self {
        if let Self::Data { has_more, .. } | Self::Items { has_more, .. } = &mut self {
            *has_more = Some(value);
        }
        self
    }

    /// Set a top-level total page count. No effect on bare arrays.
    #[must_use]
    pub fn with_total_pages(mut self, value: u64) -> Self {
        if let Self::Data { total_pages, .. } | Self::Items { total_pages, .. } = &mut self {
            *total_pages = Some(value);
        }
        self
    }

    /// Normalize into a uniform page result.
    ///
    /// `has_more` resolves as: top-level flag, then `pagination.has_more`,
    /// then "the page came back full".
    pub fn into_page(self, page: u32, page_size: u32) -> PageResult<T> {
        let (items, has_more, total_pages) = match self {
            Self::Bare(items) => {
                let full = items.len() == page_size as usize;
                (items, full, None)
            }
            Self::Data {
                data: items,
                has_more,
                total_pages,
                pagination,
            }
            | Self::Items {
                items,
                has_more,
                total_pages,
                pagination,
            } => {
                let full = items.len() == page_size as usize;
                let nested = pagination.unwrap_or_default();
                let has_more = has_more.or(nested.has_more).unwrap_or(full);
                (items, has_more, total_pages.or(nested.total_pages))
            }
            Self::Unrecognized(_) => (Vec::new(), false, None),
        };

        PageResult {
            total_items: items.len(),
            items,
            has_more,
            page,
            page_size,
            total_pages,
            error: None,
        }
    }
}

// ============================================================================
// Hint Decoding
// ============================================================================

/// `has_more` by truthiness: `null`, `false`, `0` and `""` are false
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    let flag = match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    };
    Ok(Some(flag))
}

/// A non-negative whole page count, from an integer, an integral float or
/// a numeric string; anything else is no hint
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Nested pagination metadata; a non-object is ignored
fn lenient_pagination<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<PaginationInfo>, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// One normalized page
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub page: u32,
    pub page_size: u32,
    /// Number of items on this page
    pub total_items: usize,
    /// Server-provided total page count, if any
    pub total_pages: Option<u64>,
    /// Set when the fetch failed and the page was replaced by an empty one
    pub error: Option<String>,
}

impl<T> PageResult<T> {
    /// The empty, final page substituted for a failed fetch
    pub fn failed(page: u32, page_size: u32, error: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            page,
            page_size,
            total_items: 0,
            total_pages: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Run Bookkeeping
// ============================================================================

/// A recorded page fetch failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageError {
    pub page: u32,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the last pagination run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginationStats {
    pub total_items: usize,
    pub total_pages: u32,
    pub page_size: u32,
    pub has_more_pages: bool,
    /// Number of failed pages
    pub errors: usize,
    pub error_details: Vec<PageError>,
    /// Whether the run was stopped by its cancellation token
    pub cancelled: bool,
}

// ============================================================================
// Fetcher Seam
// ============================================================================

/// Source of pages for a [`PaginationHandler`](super::PaginationHandler).
///
/// Implemented for any `Fn(PageParams) -> impl Future<Output = Result<PageResponse<T>, E>>`,
/// so a closure is usually all a caller needs.
pub trait PageFetcher: Send + Sync {
    /// Record type
    type Item: Send;
    /// Failure type; only its message is kept
    type Error: fmt::Display + Send;

    /// Fetch one page
    fn fetch(
        &self,
        params: PageParams,
    ) -> impl Future<Output = Result<PageResponse<Self::Item>, Self::Error>> + Send;
}

impl<F, Fut, T, E> PageFetcher for F
where
    F: Fn(PageParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PageResponse<T>, E>> + Send,
    T: Send,
    E: fmt::Display + Send,
{
    type Item = T;
    type Error = E;

    fn fetch(&self, params: PageParams) -> impl Future<Output = Result<PageResponse<T>, E>> + Send {
        self(params)
    }
}
