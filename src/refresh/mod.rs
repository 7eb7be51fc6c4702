//! Incremental refresher
//!
//! Re-checks a sample of already-loaded URLs, recording redirects and pages
//! that are gone, and re-fetches a few members of every known template to
//! detect site-wide path migrations. Findings go to `refresh_mapping.json`;
//! when applying is enabled, affected store entries are marked superseded.

mod drift;

pub use drift::{detect_drift, TemplateMapping};

use crate::artifact::{self, read_ndjson, write_json_atomic};
use crate::fetcher::{fetch_with_retry, Fetch, FetchError, FetchRequest, FetchResponse, RetryPolicy};
use crate::loader::{open_store, store_exists};
use crate::pipeline::StageContext;
use crate::records::{CleanRecord, StageStats, SCHEMA_VERSION};
use crate::template::{eligible_urls, load_templates, members_of};
use crate::url::normalize_url_lossy;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Outcome of re-checking one URL
#[derive(Debug, Clone, PartialEq)]
pub enum UrlCheck {
    Unchanged,
    Redirected(String),
    Gone(u16),
    /// Any other non-2xx status
    Failed(u16),
    Unreachable(String),
}

/// Classifies a fetch result against the URL that was requested
pub fn classify(url: &str, result: &std::result::Result<FetchResponse, FetchError>) -> UrlCheck {
    match result {
        Err(e) => UrlCheck::Unreachable(e.to_string()),
        Ok(response) if response.is_not_found() => UrlCheck::Gone(response.status),
        Ok(response) if !response.is_success() => UrlCheck::Failed(response.status),
        Ok(response) => {
            if normalize_url_lossy(&response.final_url) == normalize_url_lossy(url) {
                UrlCheck::Unchanged
            } else {
                UrlCheck::Redirected(response.final_url.clone())
            }
        }
    }
}

/// One `old_url -> final_url` redirect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub old_url: String,
    pub new_url: String,
}

/// A URL that answered 404 or 410
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoneUrl {
    pub url: String,
    pub status: u16,
}

/// Contents of `refresh_mapping.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshMapping {
    pub schema_version: u32,
    pub domain: String,
    pub checked: usize,
    pub redirects: Vec<UrlMapping>,
    pub not_found: Vec<GoneUrl>,
    pub template_changes: Vec<TemplateMapping>,
    /// Whether the store was updated from this mapping
    pub applied: bool,
    pub generated_at: DateTime<Utc>,
}

/// Up to `size` URLs spread evenly over `urls`
pub fn spread_sample(urls: &[String], size: usize) -> Vec<String> {
    if size == 0 || urls.is_empty() {
        return Vec::new();
    }
    if urls.len() <= size {
        return urls.to_vec();
    }
    let step = urls.len() as f64 / size as f64;
    (0..size)
        .map(|i| urls[(i as f64 * step) as usize].clone())
        .collect()
}

/// Loaded URLs: active store entries, else the clean catalog
fn loaded_urls(ctx: &StageContext) -> Result<Vec<String>> {
    if store_exists(ctx) {
        let store = open_store(ctx)?;
        return Ok(store.active_urls()?);
    }
    let path = ctx.paths.catalog_ndjson();
    artifact::require(&path, "clean")?;
    let records: Vec<CleanRecord> = read_ndjson(&path)?;
    let urls: BTreeSet<String> = records
        .into_iter()
        .map(|r| r.url)
        .filter(|u| !u.is_empty())
        .collect();
    Ok(urls.into_iter().collect())
}

/// Drift samples per known template, empty when grouping never ran
fn template_samples(ctx: &StageContext) -> Result<Vec<(String, Vec<String>)>> {
    if !ctx.paths.templates().exists() || !ctx.paths.urls().exists() {
        tracing::warn!("No templates for {}; skipping drift detection", ctx.domain);
        return Ok(Vec::new());
    }
    let summary = load_templates(&ctx.paths)?;
    let urls = eligible_urls(&ctx.paths, None)?;
    let per_template = ctx.config.refresh.per_template_sample;
    Ok(summary
        .templates
        .iter()
        .map(|t| {
            let members = members_of(&t.pattern, urls.iter().map(String::as_str));
            (t.pattern.clone(), spread_sample(&members, per_template))
        })
        .filter(|(_, sample)| !sample.is_empty())
        .collect())
}

/// Fetches every URL once at bounded concurrency
async fn check_all(
    fetcher: Arc<dyn Fetch>,
    policy: &RetryPolicy,
    urls: BTreeSet<String>,
    concurrency: usize,
) -> HashMap<String, std::result::Result<FetchResponse, FetchError>> {
    stream::iter(urls)
        .map(|url| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                let request = FetchRequest::new(url.clone());
                let result = fetch_with_retry(fetcher.as_ref(), &request, policy).await;
                (url, result)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Runs the refresh stage
pub async fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("refresh");
    let loaded = loaded_urls(ctx)?;
    let sample = spread_sample(&loaded, ctx.config.refresh.sample_size);
    let drift_samples = template_samples(ctx)?;
    stats.input = sample.len() as u64;
    tracing::info!(
        "Refreshing {} of {} loaded URLs and {} templates for {}",
        sample.len(),
        loaded.len(),
        drift_samples.len(),
        ctx.domain
    );

    let mut to_fetch: BTreeSet<String> = sample.iter().cloned().collect();
    for (_, members) in &drift_samples {
        to_fetch.extend(members.iter().cloned());
    }
    let fetcher = ctx.http_fetcher()?;
    let results = check_all(
        fetcher,
        &ctx.retry_policy(),
        to_fetch,
        ctx.config.fetch.max_concurrency,
    )
    .await;

    let mut redirects = Vec::new();
    let mut not_found = Vec::new();
    for url in &sample {
        let Some(result) = results.get(url) else {
            stats.drop_item("not_checked");
            continue;
        };
        match classify(url, result) {
            UrlCheck::Unchanged => stats.output += 1,
            UrlCheck::Redirected(new_url) => {
                tracing::debug!("{} -> {}", url, new_url);
                redirects.push(UrlMapping {
                    old_url: url.clone(),
                    new_url,
                });
                stats.output += 1;
            }
            UrlCheck::Gone(status) => {
                tracing::debug!("{} is gone ({})", url, status);
                not_found.push(GoneUrl {
                    url: url.clone(),
                    status,
                });
                stats.output += 1;
            }
            UrlCheck::Failed(status) => {
                tracing::warn!("HTTP {} while refreshing {}", status, url);
                stats.drop_item("http_error");
            }
            UrlCheck::Unreachable(message) => {
                tracing::warn!("{}", message);
                stats.drop_item("unreachable");
            }
        }
    }

    let mut template_changes = Vec::new();
    for (pattern, members) in &drift_samples {
        let finals: Vec<String> = members
            .iter()
            .filter_map(|m| match results.get(m) {
                Some(Ok(response)) if response.is_success() => Some(response.final_url.clone()),
                _ => None,
            })
            .collect();
        if let Some(mapping) = detect_drift(pattern, &finals, ctx.config.refresh.drift_threshold) {
            tracing::warn!(
                "Template drift: {} -> {} ({}/{} sampled URLs)",
                mapping.old_pattern,
                mapping.new_pattern,
                mapping.moved,
                mapping.sampled
            );
            template_changes.push(mapping);
        }
    }

    let apply = ctx.config.refresh.apply || ctx.options.apply_refresh;
    let mut superseded = 0u64;
    if apply && (!redirects.is_empty() || !not_found.is_empty()) {
        let mut store = open_store(ctx)?;
        for mapping in &redirects {
            if store.mark_superseded(&mapping.old_url, Some(&mapping.new_url))? {
                superseded += 1;
            }
        }
        for gone in &not_found {
            if store.mark_superseded(&gone.url, None)? {
                superseded += 1;
            }
        }
        store.flush()?;
        tracing::info!("Marked {} store entries superseded", superseded);
    }

    let mapping = RefreshMapping {
        schema_version: SCHEMA_VERSION,
        domain: ctx.domain.clone(),
        checked: sample.len(),
        redirects,
        not_found,
        template_changes,
        applied: apply,
        generated_at: Utc::now(),
    };
    write_json_atomic(&ctx.paths.refresh_mapping(), &mapping)?;

    stats.detail("redirects", mapping.redirects.len() as u64);
    stats.detail("not_found", mapping.not_found.len() as u64);
    stats.detail("template_changes", mapping.template_changes.len() as u64);
    stats.detail("superseded", superseded);
    Ok(stats.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{read_json, write_csv_atomic, write_ndjson_atomic};
    use crate::config::{Config, LoaderBackend};
    use crate::fetcher::testing::StaticFetcher;
    use crate::loader::{self, NaturalKey};
    use crate::pipeline::StageOptions;
    use crate::records::UrlRecord;
    use crate::template;
    use std::time::Duration;

    const OLD: [&str; 3] = [
        "https://shop.example/product/widget-a",
        "https://shop.example/product/widget-b",
        "https://shop.example/product/widget-c",
    ];

    fn clean(url: &str) -> CleanRecord {
        let now = Utc::now();
        CleanRecord {
            url: url.to_string(),
            title: "Widget".to_string(),
            price: None,
            description: None,
            images: Vec::new(),
            category: None,
            brand: None,
            sku: None,
            availability: None,
            rating: None,
            reviews_count: None,
            timestamp_fetched: now,
            timestamp_parsed: now,
        }
    }

    fn context(dir: &tempfile::TempDir, site: StaticFetcher) -> StageContext {
        let mut config = Config::default();
        config.paths.data_dir = dir.path().to_path_buf();
        config.crawler.max_retries = 0;
        config.loader.backend = LoaderBackend::Sqlite;
        StageContext::new("shop.example", Arc::new(config)).with_fetcher(Arc::new(site))
    }

    /// Every product moved from `/product/` to `/item/`, except C which is gone
    fn migrated_site() -> StaticFetcher {
        StaticFetcher::new()
            .html("https://shop.example/item/widget-a", "<h1>A</h1>")
            .html("https://shop.example/item/widget-b", "<h1>B</h1>")
            .redirect(OLD[0], "https://shop.example/item/widget-a")
            .redirect(OLD[1], "https://shop.example/item/widget-b")
            .status(OLD[2], 404)
    }

    #[test]
    fn test_classify() {
        let ok = |final_url: &str, status: u16| {
            Ok(FetchResponse {
                url: OLD[0].to_string(),
                final_url: final_url.to_string(),
                status,
                content_type: "text/html".to_string(),
                body: String::new(),
                last_modified: None,
                retry_after: None,
                elapsed: Duration::ZERO,
                rendered: false,
            })
        };
        assert_eq!(classify(OLD[0], &ok(OLD[0], 200)), UrlCheck::Unchanged);
        assert_eq!(
            classify(OLD[0], &ok("https://shop.example/item/widget-a", 200)),
            UrlCheck::Redirected("https://shop.example/item/widget-a".to_string())
        );
        assert_eq!(classify(OLD[0], &ok(OLD[0], 410)), UrlCheck::Gone(410));
        assert_eq!(classify(OLD[0], &ok(OLD[0], 503)), UrlCheck::Failed(503));
    }

    #[test]
    fn test_spread_sample() {
        let urls: Vec<String> = (0..10).map(|i| format!("https://shop.example/{}", i)).collect();
        let sample = spread_sample(&urls, 3);
        assert_eq!(sample.len(), 3);
        assert_eq!(sample[0], urls[0]);
        assert_eq!(spread_sample(&urls, 20).len(), 10);
        assert!(spread_sample(&urls, 0).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_records_mappings_without_applying() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(&dir, migrated_site());
        let records: Vec<CleanRecord> = OLD.iter().map(|u| clean(u)).collect();
        write_ndjson_atomic(&ctx.paths.catalog_ndjson(), &records).unwrap();

        let stats = run(&ctx).await.unwrap();
        assert_eq!(stats.input, 3);
        assert!(stats.is_accounted());

        let mapping: RefreshMapping = read_json(&ctx.paths.refresh_mapping()).unwrap();
        assert_eq!(mapping.redirects.len(), 2);
        assert_eq!(mapping.not_found, vec![GoneUrl { url: OLD[2].to_string(), status: 404 }]);
        assert!(!mapping.applied);
        assert!(mapping.template_changes.is_empty());
    }

    #[tokio::test]
    async fn test_apply_marks_store_entries_and_detects_drift() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(&dir, migrated_site()).with_options(StageOptions {
            apply_refresh: true,
            ..Default::default()
        });

        let rows: Vec<UrlRecord> = OLD
            .iter()
            .map(|url| UrlRecord {
                url: url.to_string(),
                status_code: 200,
                content_type: "text/html".to_string(),
                size: 10,
                last_modified: None,
            })
            .collect();
        write_csv_atomic(&ctx.paths.urls(), &rows).unwrap();
        template::run(&ctx).unwrap();

        let records: Vec<CleanRecord> = OLD.iter().map(|u| clean(u)).collect();
        write_ndjson_atomic(&ctx.paths.catalog_ndjson(), &records).unwrap();
        loader::run(&ctx).unwrap();

        let stats = run(&ctx).await.unwrap();
        assert_eq!(stats.details["superseded"], 3);

        let mapping: RefreshMapping = read_json(&ctx.paths.refresh_mapping()).unwrap();
        assert!(mapping.applied);
        // Two of three sampled members answer 2xx, both under /item/
        assert_eq!(mapping.template_changes.len(), 1);
        assert_eq!(mapping.template_changes[0].new_pattern, "/item/{slug}");

        let store = open_store(&ctx).unwrap();
        assert!(store.active_urls().unwrap().is_empty());
        let moved = store
            .find_by_natural_key(&NaturalKey::Url(OLD[0].to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(moved.superseded_by.as_deref(), Some("https://shop.example/item/widget-a"));
    }
}
