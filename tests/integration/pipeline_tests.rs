//! End-to-end pipeline run over three synthetic product pages

use crate::common::{context, fast_config};
use catalog_sieve::artifact::{read_json, read_ndjson, read_stats, write_csv_atomic};
use catalog_sieve::pipeline::{run_pipeline, RunOptions, RunSummary, StageStatus};
use catalog_sieve::probe::Approval;
use catalog_sieve::records::{CleanRecord, DuplicateDecision, RawRecord, UrlRecord};
use catalog_sieve::template::TemplateSummary;
use catalog_sieve::SieveError;
use std::collections::BTreeSet;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn product_page(title: &str, price: &str) -> String {
    format!(
        r#"<html><head><title>{title} | Shop</title></head>
        <body>
          <h1>{title}</h1>
          <span class="price">{price}</span>
          <img src="/img/{title}.jpg">
          <p class="stock">In Stock</p>
        </body></html>"#
    )
}

async fn shop() -> MockServer {
    let server = MockServer::start().await;
    for (route, title, price) in [
        ("/product/widget-a", "Widget A", "$1,234.50"),
        ("/product/widget-b", "Widget B", "$19.99"),
    ] {
        // The path matcher ignores the query, so ?ref=x serves the same page
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(product_page(title, price), "text/html"),
            )
            .mount(&server)
            .await;
    }
    server
}

fn url_rows(base: &str, paths: &[&str]) -> Vec<UrlRecord> {
    paths
        .iter()
        .map(|p| UrlRecord {
            url: format!("{}{}", base, p),
            status_code: 200,
            content_type: "text/html".to_string(),
            size: 200,
            last_modified: None,
        })
        .collect()
}

fn group_to_clean() -> RunOptions {
    RunOptions {
        start: Some("group".to_string()),
        end: Some("clean".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_three_pages_become_two_catalog_records() {
    let server = shop().await;
    let dir = TempDir::new().unwrap();
    let ctx = context(&server, fast_config(dir.path()));
    let rows = url_rows(
        &server.uri(),
        &["/product/widget-a", "/product/widget-a?ref=x", "/product/widget-b"],
    );
    write_csv_atomic(&ctx.paths.urls(), &rows).unwrap();

    let summary = run_pipeline(&ctx, &group_to_clean()).await.unwrap();
    assert_eq!(summary.stages.len(), 6);
    assert!(summary.stages.iter().all(|s| s.status == StageStatus::Completed));

    let templates: TemplateSummary = read_json(&ctx.paths.templates()).unwrap();
    assert_eq!(templates.templates[0].pattern, "/product/{slug}");
    assert_eq!(templates.templates[0].count, 3);

    let approval: Approval = read_json(&ctx.paths.approved()).unwrap();
    assert_eq!(approval.pattern, "/product/{slug}");

    let raw: Vec<RawRecord> = read_ndjson(&ctx.paths.extracted()).unwrap();
    assert_eq!(raw.len(), 3);

    let unique: Vec<RawRecord> = read_ndjson(&ctx.paths.unique()).unwrap();
    let duplicates: Vec<DuplicateDecision> = read_ndjson(&ctx.paths.duplicates()).unwrap();
    assert_eq!(unique.len(), 2);
    assert_eq!(duplicates.len(), 1);

    let catalog: Vec<CleanRecord> = read_ndjson(&ctx.paths.catalog_ndjson()).unwrap();
    assert_eq!(catalog.len(), 2);
    let urls: BTreeSet<&str> = catalog.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.iter().all(|u| !u.contains("ref=")));

    let widget_a = catalog.iter().find(|r| r.title == "Widget A").unwrap();
    assert_eq!(widget_a.price, Some(1234.50));
    let widget_b = catalog.iter().find(|r| r.title == "Widget B").unwrap();
    assert_eq!(widget_b.price, Some(19.99));
    assert!(ctx.paths.catalog_csv().exists());

    for stage in ["group", "probe", "fetch", "extract", "dedupe", "clean"] {
        let stats = read_stats(&ctx.paths, stage).unwrap().unwrap();
        assert!(stats.is_accounted(), "{} does not account for its input", stage);
    }
}

#[tokio::test]
async fn test_failed_coverage_gate_halts_before_fetch() {
    let server = MockServer::start().await;
    // Pages carry a title but no price anywhere
    for route in ["/product/widget-a", "/product/widget-b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body><h1>Widget</h1></body></html>", "text/html"),
            )
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let ctx = context(&server, fast_config(dir.path()));
    let rows = url_rows(&server.uri(), &["/product/widget-a", "/product/widget-b"]);
    write_csv_atomic(&ctx.paths.urls(), &rows).unwrap();

    let result = run_pipeline(&ctx, &group_to_clean()).await;
    match result {
        Err(SieveError::StageFailed { stage, source }) => {
            assert_eq!(stage, "probe");
            match *source {
                SieveError::CoverageGate { failing, .. } => assert_eq!(failing, vec!["price".to_string()]),
                other => panic!("unexpected cause: {:?}", other),
            }
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(!ctx.paths.approved().exists());
    assert!(!ctx.paths.fetch_meta().exists());
    let summary: RunSummary = read_json(&ctx.paths.run_summary()).unwrap();
    assert_eq!(summary.stages.len(), 2);
    assert_eq!(summary.stages[1].status, StageStatus::Failed);
}
