//! Batch fetcher
//!
//! Fetches every URL of the approved template in fixed-size batches at
//! bounded concurrency. Bodies go to a content-addressed page store and one
//! [`FetchMeta`] line per attempt is appended to `fetch_meta.ndjson`. Only
//! the coordinating task writes the metadata stream; workers write distinct
//! body files.
//!
//! A 429 is waited out and 401/403 responses walk the same request variants
//! the crawler uses before the attempt is recorded as blocked.
//!
//! Re-running the stage skips URLs whose page is already stored, so an
//! interrupted fetch resumes where it stopped.

mod store;

pub use store::{page_location, store_page};

use crate::artifact::{read_ndjson, ArtifactPaths, NdjsonAppender};
use crate::config::AdaptiveConfig;
use crate::crawler::{fetch_rotating, AdaptiveStrategy, RequestVariant, RotationLimits};
use crate::fetcher::{Fetch, RetryPolicy};
use crate::pipeline::StageContext;
use crate::probe::load_approval;
use crate::records::{FetchMeta, StageStats};
use crate::template::{eligible_urls, members_of};
use crate::url::site_root;
use crate::{Result, SieveError};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// What the batch fetcher will fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    pub pattern: Option<String>,
    pub render: bool,
    pub urls: Vec<String>,
}

/// Resolves the URL list: `--pattern`, else the approved template, else
/// every eligible URL
pub fn plan(ctx: &StageContext) -> Result<FetchPlan> {
    let urls = eligible_urls(&ctx.paths, None)?;
    let approval = load_approval(ctx)?;
    let recipe_render = ctx.recipe()?.render;

    let (pattern, render) = match (ctx.options.pattern.clone(), approval) {
        (Some(pattern), Some(approval)) if approval.pattern == pattern => (Some(pattern), approval.render),
        (Some(pattern), _) => (Some(pattern), recipe_render),
        (None, Some(approval)) => (Some(approval.pattern), approval.render),
        (None, None) => {
            tracing::warn!("No approved template for {}; fetching all eligible URLs", ctx.domain);
            (None, recipe_render)
        }
    };

    let urls = match &pattern {
        Some(pattern) => members_of(pattern, urls.iter().map(String::as_str)),
        None => {
            let mut seen = HashSet::new();
            urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
        }
    };
    Ok(FetchPlan {
        pattern,
        render,
        urls,
    })
}

/// URLs that already have a successful attempt in the metadata stream
fn already_fetched(paths: &ArtifactPaths) -> Result<HashSet<String>> {
    let path = paths.fetch_meta();
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let metas: Vec<FetchMeta> = read_ndjson(&path)?;
    Ok(metas
        .into_iter()
        .filter(FetchMeta::is_success)
        .map(|m| m.url)
        .collect())
}

/// Everything a worker task needs to fetch one URL
#[derive(Clone)]
struct Worker {
    fetcher: Arc<dyn Fetch>,
    paths: ArtifactPaths,
    policy: RetryPolicy,
    limits: RotationLimits,
    adaptive: AdaptiveConfig,
}

impl Worker {
    /// Request variants for `url`, with its own site root as referer
    fn variants(&self, url: &str) -> Vec<RequestVariant> {
        match Url::parse(url) {
            Ok(parsed) => AdaptiveStrategy::new(self.adaptive.clone(), &site_root(&parsed)).variants(),
            Err(_) => vec![RequestVariant::plain()],
        }
    }

    /// Fetches one URL, waiting out 429s and rotating variants on blocking
    /// responses, and stores its body
    async fn fetch_one(self, url: String) -> FetchMeta {
        let started = std::time::Instant::now();
        let variants = self.variants(&url);
        let result =
            fetch_rotating(self.fetcher.as_ref(), &url, &variants, &self.policy, &self.limits).await;
        let timestamp = Utc::now();

        match result {
            Ok(outcome) => {
                let response = outcome.response;
                let mut meta = FetchMeta {
                    url,
                    status: response.status,
                    timestamp,
                    file_path: None,
                    final_url: Some(response.final_url.clone()).filter(|f| *f != response.url),
                    content_type: Some(response.content_type.clone()),
                    bytes: response.body.len() as u64,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    rendered: response.rendered,
                    error: None,
                };
                if response.is_success() {
                    match store_page(&self.paths, &meta.url, &response.content_type, &response.body) {
                        Ok(location) => meta.file_path = Some(location),
                        Err(e) => {
                            tracing::error!("Failed to store body of {}: {}", meta.url, e);
                            meta.error = Some(e.to_string());
                        }
                    }
                } else if outcome.blocked {
                    tracing::warn!(
                        "HTTP {} for {} after {} request variants",
                        response.status,
                        meta.url,
                        variants.len()
                    );
                } else {
                    tracing::debug!("HTTP {} for {}", response.status, meta.url);
                }
                meta
            }
            Err(e) => {
                tracing::warn!("{}", e);
                FetchMeta {
                    url,
                    status: 0,
                    timestamp,
                    file_path: None,
                    final_url: None,
                    content_type: None,
                    bytes: 0,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    rendered: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Drop reason of an attempt that produced no stored page
fn failure_reason(meta: &FetchMeta) -> &'static str {
    match meta.status {
        200..=299 => "store_failed",
        401 | 403 | 429 => "blocked",
        _ => "fetch_failed",
    }
}

/// Runs the batch fetch stage
pub async fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("fetch");
    let plan = plan(ctx)?;
    stats.input = plan.urls.len() as u64;

    let done = already_fetched(&ctx.paths)?;
    let mut pending: Vec<String> = Vec::with_capacity(plan.urls.len());
    for url in plan.urls {
        if done.contains(&url) {
            stats.drop_item("already_fetched");
        } else {
            pending.push(url);
        }
    }
    if let Some(max) = ctx.options.max_urls {
        for _ in pending.drain(max.min(pending.len())..) {
            stats.drop_item("over_max_urls");
        }
    }

    let batch_size = ctx.options.batch_size.unwrap_or(ctx.config.fetch.batch_size).max(1);
    let concurrency = ctx.config.fetch.max_concurrency.max(1);
    let pause = Duration::from_millis(ctx.config.fetch.batch_pause_ms);
    tracing::info!(
        "Fetching {} URLs for {} ({}) in batches of {}, concurrency {}, render {}",
        pending.len(),
        ctx.domain,
        plan.pattern.as_deref().unwrap_or("all templates"),
        batch_size,
        concurrency,
        plan.render
    );

    let worker = Worker {
        fetcher: ctx.page_fetcher(plan.render)?,
        paths: ctx.paths.clone(),
        policy: ctx.retry_policy(),
        limits: RotationLimits::from_config(
            &ctx.config.crawler,
            AdaptiveStrategy::new(ctx.config.adaptive.clone(), "").delay(),
        ),
        adaptive: ctx.config.adaptive.clone(),
    };
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut appender = NdjsonAppender::open(&ctx.paths.fetch_meta())?;
    let mut status_codes: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_bytes = 0u64;

    let batches: Vec<&[String]> = pending.chunks(batch_size).collect();
    for (index, batch) in batches.iter().enumerate() {
        if ctx.is_stopped() {
            appender.flush()?;
            return Err(SieveError::Interrupted(ctx.paths.fetch_meta().display().to_string()));
        }

        let mut workers = JoinSet::new();
        for url in batch.iter() {
            let permit_source = Arc::clone(&semaphore);
            let worker = worker.clone();
            let url = url.clone();
            workers.spawn(async move {
                let _permit = permit_source.acquire_owned().await;
                worker.fetch_one(url).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            let meta = joined?;
            *status_codes.entry(meta.status.to_string()).or_insert(0) += 1;
            if meta.is_success() {
                stats.output += 1;
                total_bytes += meta.bytes;
            } else {
                stats.drop_item(failure_reason(&meta));
            }
            appender.append(&meta)?;
        }
        appender.flush()?;
        tracing::info!(
            "Batch {}/{} done ({} fetched so far)",
            index + 1,
            batches.len(),
            stats.output
        );

        if index + 1 < batches.len() && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    stats.detail("status_codes", serde_json::to_value(&status_codes)?);
    stats.detail("bytes", total_bytes);
    if let Some(pattern) = plan.pattern {
        stats.detail("pattern", pattern);
    }
    Ok(stats.finish())
}
