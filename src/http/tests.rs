//! Tests for the HTTP module

use super::*;
use crate::error::Error;
use crate::logging::Logger;
use crate::pagination::{PageFetcher, PageParams, PaginationConfig, PaginationHandler};
use crate::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::types::BackoffType;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .build();
    HttpClient::with_config(config).unwrap()
}

fn fast_limiter() -> Arc<RateLimiter> {
    Arc::new(
        RateLimiter::new(RateLimiterConfig::new(100, 1_000).with_base_backoff_ms(10))
            .with_logger(Logger::silent()),
    )
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout(), Duration::from_secs(30));
    assert_eq!(config.max_retries, 3);
    assert!(config.base_url.is_none());
    assert!(config.user_agent.starts_with("bulksync/"));
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.example.com")
        .timeout(Duration::from_secs(60))
        .max_retries(5)
        .backoff(
            BackoffType::Linear,
            Duration::from_millis(200),
            Duration::from_secs(30),
        )
        .header("X-Custom", "value")
        .user_agent("test-agent/1.0")
        .build();

    assert_eq!(config.base_url, Some("https://api.example.com".to_string()));
    assert_eq!(config.timeout_ms, 60_000);
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.backoff_type, BackoffType::Linear);
    assert_eq!(config.initial_backoff_ms, 200);
    assert_eq!(config.max_backoff_ms, 30_000);
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
}

#[test]
fn test_http_client_config_yaml() {
    let config: HttpClientConfig = serde_yaml::from_str(
        "base_url: https://api.example.com\nbackoff_type: linear\nmax_retries: 1\n",
    )
    .unwrap();
    assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(config.backoff_type, BackoffType::Linear);
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.timeout_ms, 30_000);
}

#[test]
fn test_request_config_builder() {
    let config = RequestConfig::new()
        .query("page", "1")
        .query_pairs(vec![("limit".to_string(), "10".to_string())])
        .header("X-Request-Id", "abc123")
        .json(json!({"key": "value"}))
        .timeout(Duration::from_secs(10))
        .retries(2);

    assert_eq!(
        config.query,
        vec![
            ("page".to_string(), "1".to_string()),
            ("limit".to_string(), "10".to_string())
        ]
    );
    assert_eq!(
        config.headers.get("X-Request-Id"),
        Some(&"abc123".to_string())
    );
    assert!(config.body.is_some());
    assert_eq!(config.timeout, Some(Duration::from_secs(10)));
    assert_eq!(config.max_retries, Some(2));
}

#[test]
fn test_calculate_backoff() {
    let backoff = |backoff_type| {
        let config = HttpClientConfig::builder()
            .backoff(
                backoff_type,
                Duration::from_millis(100),
                Duration::from_millis(500),
            )
            .build();
        HttpClient::with_config(config).unwrap()
    };

    let constant = backoff(BackoffType::Constant);
    assert_eq!(constant.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(constant.calculate_backoff(5), Duration::from_millis(100));

    let linear = backoff(BackoffType::Linear);
    assert_eq!(linear.calculate_backoff(1), Duration::from_millis(200));
    assert_eq!(linear.calculate_backoff(2), Duration::from_millis(300));

    let exponential = backoff(BackoffType::Exponential);
    assert_eq!(exponential.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(exponential.calculate_backoff(2), Duration::from_millis(400));
    // Capped at the max
    assert_eq!(exponential.calculate_backoff(10), Duration::from_millis(500));
    assert_eq!(exponential.calculate_backoff(40), Duration::from_millis(500));
}

#[test]
fn test_http_client_debug() {
    let client = HttpClient::new().unwrap();
    let debug_str = format!("{client:?}");
    assert!(debug_str.contains("HttpClient"));
    assert!(debug_str.contains("has_rate_limiter: false"));
}

// ============================================================================
// Request Tests
// ============================================================================

#[tokio::test]
async fn test_get_json_with_query_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("q", "test"))
        .and(header("X-API-Key", "secret123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 42})))
        .mount(&server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(format!("{}/", server.uri()))
        .header("X-API-Key", "secret123")
        .build();
    let client = HttpClient::with_config(config).unwrap();

    let data: serde_json::Value = client
        .get_json_with_config("/api/search", RequestConfig::new().query("q", "test"))
        .await
        .unwrap();
    assert_eq!(data["value"], 42);
}

#[tokio::test]
async fn test_post_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(wiremock::matchers::body_json(json!({"name": "test"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .post_json("/api/items", json!({"name": "test"}))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_full_url_bypasses_base() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/test"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let response = client
        .get(&format!("{}/api/test", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).get("/api/missing").await.unwrap_err();
    match err {
        Error::HttpStatus { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "Not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let response = client_for(&server).get("/api/flaky").await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_server_error_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/always-fail"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server error"))
        .expect(3)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .get_with_config("/api/always-fail", RequestConfig::new().retries(2))
        .await;
    assert!(matches!(result, Err(Error::HttpStatus { status: 500, .. })));
}

#[tokio::test]
async fn test_429_surfaces_as_rate_limited_without_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_string("Rate limited"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).get("/api/limited").await.unwrap_err();
    assert!(matches!(
        err,
        Error::RateLimited {
            retry_after_seconds: 7
        }
    ));
    assert_eq!(err.status_code(), Some(429));
}

#[tokio::test]
async fn test_429_retried_through_rate_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let limiter = fast_limiter();
    let client = client_for(&server).with_rate_limiter(Arc::clone(&limiter));
    assert!(client.rate_limiter().is_some());

    let response = client.get("/api/limited").await.unwrap();
    assert_eq!(response.status(), 200);

    let status = limiter.status().await;
    assert_eq!(status.rate_limit_errors, 2);
    assert_eq!(status.requests_in_window, 3);
    assert_eq!(status.current_backoff_ms, 10);
}

// ============================================================================
// Page Fetcher Tests
// ============================================================================

#[tokio::test]
async fn test_page_fetcher_sends_params_and_decodes_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients"))
        .and(query_param("page", "0"))
        .and(query_param("page_size", "2"))
        .and(query_param("status", "active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}, {"id": 2}],
            "pagination": {"has_more": false}
        })))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(Arc::new(client_for(&server)), "/clients");
    assert_eq!(fetcher.path(), "/clients");

    let mut params = PageParams::new(0, 2);
    params.extra.insert("status".into(), json!("active"));
    let page = fetcher.fetch(params).await.unwrap().into_page(0, 2);

    assert_eq!(page.items, vec![json!({"id": 1}), json!({"id": 2})]);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_page_fetcher_drives_pagination() {
    let server = MockServer::start().await;
    for (page, body) in [
        ("0", json!([{"id": 1}, {"id": 2}])),
        ("1", json!({"items": [{"id": 3}, {"id": 4}]})),
        ("2", json!({"items": [{"id": 5}]})),
    ] {
        Mock::given(method("GET"))
            .and(path("/records"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let fetcher = HttpPageFetcher::new(Arc::new(client_for(&server)), "/records");
    let mut handler =
        PaginationHandler::with_config(fetcher, PaginationConfig::new().with_page_size(2))
            .with_logger(Logger::silent());

    let records = handler.fetch_all_pages(Default::default()).await;
    let ids: Vec<i64> = records.iter().filter_map(|r| r["id"].as_i64()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(handler.stats().total_pages, 3);
    assert_eq!(handler.stats().errors, 0);
}

#[tokio::test]
async fn test_page_fetcher_failure_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/records"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad page"))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(Arc::new(client_for(&server)), "/records");
    let mut handler =
        PaginationHandler::with_config(fetcher, PaginationConfig::new().with_page_size(2))
            .with_logger(Logger::silent());

    let records = handler.fetch_all_pages(Default::default()).await;
    assert_eq!(records.len(), 2);

    let stats = handler.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.error_details[0].page, 1);
    assert_eq!(stats.error_details[0].error, "HTTP 400: bad page");
}
