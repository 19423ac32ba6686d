//! HTTP-backed page fetcher

use super::client::{HttpClient, RequestConfig};
use crate::error::Error;
use crate::pagination::{PageFetcher, PageParams, PageResponse};
use crate::types::JsonValue;
use reqwest::Method;
use std::future::Future;
use std::sync::Arc;

/// Fetches pages with `GET <path>?page_size=..&page=..&<extra>`.
///
/// The body may be any shape [`PageResponse`] understands.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Arc<HttpClient>,
    path: String,
}

impl HttpPageFetcher {
    /// Create a fetcher for `path`, relative to the client's base URL or absolute
    pub fn new(client: Arc<HttpClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    /// Endpoint requested for every page
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PageFetcher for HttpPageFetcher {
    type Item = JsonValue;
    type Error = Error;

    fn fetch(
        &self,
        params: PageParams,
    ) -> impl Future<Output = Result<PageResponse<JsonValue>, Error>> + Send {
        let request = RequestConfig::new().query_pairs(params.query_pairs());
        async move {
            self.client
                .request_json(Method::GET, &self.path, request)
                .await
        }
    }
}
