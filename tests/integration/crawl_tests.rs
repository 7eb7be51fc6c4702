//! Integration tests for the frontier crawler
//!
//! A small deterministic link graph is served by wiremock; the crawl is run
//! once straight through and once interrupted and resumed from its
//! checkpoint.

use crate::common::{context, fast_config};
use catalog_sieve::artifact::read_csv;
use catalog_sieve::crawler::{self, CheckpointState, Crawler};
use catalog_sieve::records::UrlRecord;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_page(server: &MockServer, route: &str, links: &[&str]) {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">{}</a>"#, l, l))
        .collect();
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(format!("<html><body>{}</body></html>", anchors), "text/html"),
        )
        .mount(server)
        .await;
}

/// `/` -> a, b; a -> c, b; b -> d; c -> /; d -> e (unmounted, 404)
async fn link_graph() -> MockServer {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a", "/b"]).await;
    mount_page(&server, "/a", &["/c", "/b"]).await;
    mount_page(&server, "/b", &["/d"]).await;
    mount_page(&server, "/c", &["/"]).await;
    mount_page(&server, "/d", &["/e", "https://elsewhere.example/x"]).await;
    server
}

fn crawled(records: &[UrlRecord]) -> BTreeSet<(String, u16)> {
    records
        .iter()
        .map(|r| (r.url.clone(), r.status_code))
        .collect()
}

#[tokio::test]
async fn test_full_crawl_records_every_reachable_url() {
    let server = link_graph().await;
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.site.start_urls = vec![format!("{}/", server.uri())];
    let ctx = context(&server, config);

    let stats = crawler::run(&ctx).await.unwrap();
    let records: Vec<UrlRecord> = read_csv(&ctx.paths.urls()).unwrap();

    assert_eq!(records.len(), 6);
    assert_eq!(stats.output, 6);
    let not_found: Vec<&UrlRecord> = records.iter().filter(|r| r.status_code == 404).collect();
    assert_eq!(not_found.len(), 1);
    assert!(not_found[0].url.ends_with("/e"));
    assert!(records.iter().all(|r| !r.url.contains("elsewhere.example")));
    assert!(!ctx.paths.checkpoint().exists());
}

#[tokio::test]
async fn test_resumed_crawl_matches_uninterrupted_crawl() {
    let server = link_graph().await;

    let straight_dir = TempDir::new().unwrap();
    let mut config = fast_config(straight_dir.path());
    config.site.start_urls = vec![format!("{}/", server.uri())];
    let straight = context(&server, config);
    crawler::run(&straight).await.unwrap();
    let expected: Vec<UrlRecord> = read_csv(&straight.paths.urls()).unwrap();

    let resumed_dir = TempDir::new().unwrap();
    let mut config = fast_config(resumed_dir.path());
    config.site.start_urls = vec![format!("{}/", server.uri())];
    let resumed = context(&server, config);
    {
        let mut partial = Crawler::open(
            &resumed.domain,
            Arc::clone(&resumed.config),
            resumed.paths.clone(),
            resumed.http_fetcher().unwrap(),
            false,
            resumed.stop_flag(),
        )
        .await
        .unwrap();
        assert!(partial.step().await.unwrap());
        assert!(partial.step().await.unwrap());
        partial.checkpoint().unwrap();
    }

    let saved = CheckpointState::load(&resumed.paths.checkpoint(), &resumed.domain)
        .unwrap()
        .unwrap();
    assert_eq!(saved.visited.len(), 2);
    assert!(!resumed.paths.urls().exists());

    let stats = crawler::run(&resumed).await.unwrap();
    assert_eq!(stats.details["resumed"], true);
    let actual: Vec<UrlRecord> = read_csv(&resumed.paths.urls()).unwrap();
    assert_eq!(crawled(&actual), crawled(&expected));
}

#[tokio::test]
async fn test_rate_limited_page_is_retried_after_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, "/busy", &[]).await;

    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.site.start_urls = vec![format!("{}/busy", server.uri())];
    let ctx = context(&server, config);

    crawler::run(&ctx).await.unwrap();
    let records: Vec<UrlRecord> = read_csv(&ctx.paths.urls()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, 200);
}

#[tokio::test]
async fn test_unreachable_url_is_recorded_with_status_zero() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    // Nothing listens on port 1
    config.site.start_urls = vec!["http://127.0.0.1:1/".to_string()];
    let ctx = context(&server, config);

    crawler::run(&ctx).await.unwrap();
    let records: Vec<UrlRecord> = read_csv(&ctx.paths.urls()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, 0);
}

#[tokio::test]
async fn test_forbidden_pages_rotate_referer_then_block_pattern() {
    let server = MockServer::start().await;
    let site_root = format!("{}/", server.uri());
    mount_page(&server, "/", &["/guarded/alpha", "/members/1", "/members/2"]).await;
    Mock::given(method("GET"))
        .and(path("/guarded/alpha"))
        .and(header("referer", site_root.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<h1>alpha</h1>", "text/html"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guarded/alpha"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members/1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members/2"))
        .respond_with(ResponseTemplate::new(403))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = fast_config(dir.path());
    config.site.start_urls = vec![site_root.clone()];
    let ctx = context(&server, config);

    let stats = crawler::run(&ctx).await.unwrap();
    let records: Vec<UrlRecord> = read_csv(&ctx.paths.urls()).unwrap();
    let statuses = crawled(&records);

    assert!(statuses.contains(&(format!("{}guarded/alpha", site_root), 200)));
    assert!(statuses.contains(&(format!("{}members/1", site_root), 403)));
    assert!(records.iter().all(|r| !r.url.ends_with("/members/2")));
    assert_eq!(stats.dropped["blocked_pattern"], 1);
    assert_eq!(stats.details["blocked_patterns"], serde_json::json!(["/members/{id}"]));
}
