//! HTTP fetcher behavior against a mock server

use catalog_sieve::config::UserAgentConfig;
use catalog_sieve::fetcher::{fetch_with_retry, Fetch, FetchRequest, HttpFetcher, RetryPolicy};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&UserAgentConfig::default(), Duration::from_secs(5))
        .expect("Failed to build HTTP client")
}

#[tokio::test]
async fn test_429_exposes_retry_after() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(format!("{}/limited", mock_server.uri()));
    let response = fetcher().fetch(&request).await.unwrap();

    assert_eq!(response.status, 429);
    assert!(response.is_blocking());
    assert_eq!(response.retry_after, Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_404_is_not_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(format!("{}/gone", mock_server.uri()));
    let policy = RetryPolicy::fixed(3, Duration::from_millis(10));
    let response = fetch_with_retry(&fetcher(), &request, &policy).await.unwrap();

    assert_eq!(response.status, 404);
    assert!(response.is_not_found());
}

#[tokio::test]
async fn test_server_errors_are_retried_within_budget() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<h1>ok</h1>", "text/html"),
        )
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(format!("{}/flaky", mock_server.uri()));
    let policy = RetryPolicy::fixed(3, Duration::from_millis(10));
    let response = fetch_with_retry(&fetcher(), &request, &policy).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(response.is_html());
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_exhausted_budget_returns_last_server_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let request = FetchRequest::new(format!("{}/down", mock_server.uri()));
    let policy = RetryPolicy::fixed(1, Duration::from_millis(10));
    let response = fetch_with_retry(&fetcher(), &request, &policy).await.unwrap();
    assert_eq!(response.status, 500);
}
