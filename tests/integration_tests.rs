//! Integration tests using mock HTTP server
//!
//! Composes the components the way a sync job does: pages fetched through a
//! shared rate limiter, memoized by the query cache, and records pushed back
//! in batches.

use bulksync::batch::{BatchConfig, BatchProcessor};
use bulksync::cache::{CacheConfig, QueryCache};
use bulksync::config::Settings;
use bulksync::http::{HttpClient, HttpClientConfig, HttpPageFetcher, RequestConfig};
use bulksync::logging::Logger;
use bulksync::pagination::{PageParams, PageResponse, PaginationConfig, PaginationHandler};
use bulksync::rate_limit::{RateLimiter, RateLimiterConfig};
use bulksync::types::{BackoffType, JsonObject, JsonValue};
use bulksync::Error;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, limiter: Arc<RateLimiter>) -> HttpClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .max_retries(1)
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(5),
            Duration::from_millis(50),
        )
        .build();
    HttpClient::with_config(config)
        .unwrap()
        .with_rate_limiter(limiter)
}

fn limiter() -> Arc<RateLimiter> {
    Arc::new(
        RateLimiter::new(RateLimiterConfig::new(100, 1_000).with_base_backoff_ms(10))
            .with_logger(Logger::silent()),
    )
}

async fn mount_page(server: &MockServer, page: u32, body: JsonValue, times: u64) {
    Mock::given(method("GET"))
        .and(path("/clients"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

// ============================================================================
// Pagination + Rate Limiting
// ============================================================================

#[tokio::test]
async fn test_concurrent_pagination_through_shared_limiter() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        json!({"data": [{"id": 1}, {"id": 2}], "total_pages": 4}),
        1,
    )
    .await;
    mount_page(&server, 1, json!({"data": [{"id": 3}, {"id": 4}]}), 1).await;
    mount_page(&server, 2, json!({"data": [{"id": 5}, {"id": 6}]}), 1).await;
    mount_page(&server, 3, json!({"data": [{"id": 7}]}), 1).await;

    let limiter = limiter();
    let client = Arc::new(client_for(&server, Arc::clone(&limiter)));
    let fetcher = HttpPageFetcher::new(client, "/clients");
    let config = PaginationConfig::new()
        .with_page_size(2)
        .with_concurrency(2);
    let mut handler =
        PaginationHandler::with_config(fetcher, config).with_logger(Logger::silent());

    let records = handler.fetch_all_pages_concurrently(JsonObject::new()).await;

    let ids: Vec<i64> = records.iter().filter_map(|r| r["id"].as_i64()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);

    let stats = handler.stats();
    assert_eq!(stats.total_pages, 4);
    assert_eq!(stats.errors, 0);

    let status = limiter.status().await;
    assert_eq!(status.requests_in_window, 4);
    assert_eq!(status.rate_limit_errors, 0);
}

#[tokio::test]
async fn test_pagination_recovers_from_throttled_page() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!([{"id": 1}, {"id": 2}]), 1).await;
    Mock::given(method("GET"))
        .and(path("/clients"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, 1, json!([{"id": 3}]), 1).await;

    let limiter = limiter();
    let client = Arc::new(client_for(&server, Arc::clone(&limiter)));
    let config = PaginationConfig::new().with_page_size(2);
    let fetcher = HttpPageFetcher::new(client, "/clients");
    let mut handler =
        PaginationHandler::with_config(fetcher, config).with_logger(Logger::silent());

    let records = handler.fetch_all_pages(JsonObject::new()).await;

    assert_eq!(records.len(), 3);
    assert_eq!(handler.stats().errors, 0);
    assert_eq!(limiter.status().await.rate_limit_errors, 1);
}

// ============================================================================
// Pagination + Query Cache
// ============================================================================

#[tokio::test]
async fn test_cached_pages_are_not_refetched() {
    let server = MockServer::start().await;
    mount_page(&server, 0, json!({"items": [{"id": 1}, {"id": 2}]}), 1).await;
    mount_page(&server, 1, json!({"items": [{"id": 3}]}), 1).await;

    let client = Arc::new(client_for(&server, limiter()));
    let cache: Arc<QueryCache<JsonValue>> =
        Arc::new(QueryCache::new().with_logger(Logger::silent()));

    let fetcher = {
        let client = Arc::clone(&client);
        let cache = Arc::clone(&cache);
        move |params: PageParams| {
            let client = Arc::clone(&client);
            let cache = Arc::clone(&cache);
            async move {
                let key = params.to_map();
                let body = cache
                    .execute_with_cache(
                        "clients",
                        &key,
                        || async {
                            let request = RequestConfig::new().query_pairs(params.query_pairs());
                            client.get_json_with_config::<JsonValue>("/clients", request).await
                        },
                        None,
                    )
                    .await?;
                serde_json::from_value::<PageResponse<JsonValue>>(body).map_err(Error::from)
            }
        }
    };

    let config = PaginationConfig::new().with_page_size(2);
    let mut handler =
        PaginationHandler::with_config(fetcher, config).with_logger(Logger::silent());

    let first = handler.fetch_all_pages(JsonObject::new()).await;
    let second = handler.fetch_all_pages(JsonObject::new()).await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);

    let stats = cache.stats().await;
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.size, 2);

    cache.clear_by_prefix("clients").await;
    assert!(cache.is_empty().await);
}

// ============================================================================
// Batch Push
// ============================================================================

#[tokio::test]
async fn test_batch_push_records_failed_items() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/records"))
        .and(body_partial_json(json!({"id": 3})))
        .respond_with(ResponseTemplate::new(422).set_body_string("duplicate id"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(201))
        .expect(4)
        .mount(&server)
        .await;

    let client = client_for(&server, limiter());
    let records: Vec<JsonValue> = (1..=5).map(|id| json!({"id": id})).collect();

    let mut processor = BatchProcessor::with_config(BatchConfig::new().with_batch_size(2).with_concurrency(2))
        .with_logger(Logger::silent());
    let client = &client;
    let stats = processor
        .process_all(&records, move |record, _index| async move {
            client.post_json("/records", record).await.map(drop)
        })
        .await;

    assert_eq!(stats.total_items, 5);
    assert_eq!(stats.processed_items, 4);
    assert_eq!(stats.failed_items, 1);
    assert_eq!(stats.total_batches, 3);
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.successful_batches, 2);

    let failure = &stats.errors[0];
    assert_eq!(failure.item_index, 2);
    assert_eq!(failure.item, json!({"id": 3}));
    assert_eq!(failure.error, "HTTP 422: duplicate id");
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn test_components_built_from_settings_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "pagination:\n  page_size: 25\n  concurrency: 4\nbatch:\n  batch_size: 10\ncache:\n  ttl_ms: 1000\n  max_size: 20\nrate_limit:\n  max_requests: 5\n  time_window_ms: 1000\n"
    )
    .unwrap();

    let settings = Settings::load(file.path()).unwrap();
    settings.validate().unwrap();

    assert_eq!(settings.pagination.page_size, 25);
    assert_eq!(settings.pagination.concurrency, 4);
    assert_eq!(settings.batch.batch_size, 10);

    let limiter = RateLimiter::new(settings.rate_limit.clone());
    assert_eq!(limiter.config().max_requests, 5);

    let cache: QueryCache<String> = QueryCache::with_config(settings.cache.clone());
    assert_eq!(cache.config(), &CacheConfig::new().with_ttl_ms(1000).with_max_size(20));

    let params = JsonObject::new();
    let value = tokio_test::block_on(async {
        cache.set("accounts", &params, "cached".to_string(), None).await;
        cache.get("accounts", &params).await
    });
    assert_eq!(value.as_deref(), Some("cached"));
}
