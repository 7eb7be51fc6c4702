//! Frontier crawler
//!
//! Discovers the URL universe of one site, either by following links
//! breadth-first from the start URLs or by walking its sitemaps. Both modes
//! share the same checkpoint/resume contract and the same adaptive fetch
//! strategy.

pub mod adaptive;
pub mod checkpoint;
mod coordinator;
mod frontier;
pub mod parser;
pub mod sitemap;

pub use adaptive::{
    fetch_rotating, AdaptiveStrategy, PatternOutcome, RequestVariant, RotatedResponse, RotationLimits,
};
pub use checkpoint::CheckpointState;
pub use coordinator::{CrawlReport, Crawler};
pub use frontier::Frontier;

use crate::pipeline::StageContext;
use crate::records::StageStats;
use crate::{Result, SieveError};
use std::sync::Arc;

/// Runs the crawl stage for the context's domain
///
/// Resumes from an existing checkpoint unless `--fresh` was given. An
/// interrupted crawl is reported as [`SieveError::Interrupted`] so that no
/// downstream stage runs on a partial URL set.
pub async fn run(ctx: &StageContext) -> Result<StageStats> {
    let fetcher = ctx.http_fetcher()?;
    let mut crawler = Crawler::open(
        &ctx.domain,
        Arc::clone(&ctx.config),
        ctx.paths.clone(),
        fetcher,
        ctx.options.fresh,
        ctx.stop_flag(),
    )
    .await?;

    let report = crawler.run().await?;
    if !report.completed {
        return Err(SieveError::Interrupted(
            ctx.paths.checkpoint().display().to_string(),
        ));
    }
    Ok(crawler.stats())
}
