//! Template grouping
//!
//! Generalizes every successfully crawled HTML URL into a path template,
//! groups URLs sharing a template, guesses each group's page type and ranks
//! the groups for the sample prober.

mod grouper;
pub mod rules;

pub use grouper::{group_urls, members_of, priority_score, TemplateSummary, UrlTemplate};
pub use rules::{generalize_path, generalize_url, guess_page_type};

use crate::artifact::{self, read_csv, write_json_atomic, ArtifactPaths};
use crate::pipeline::StageContext;
use crate::records::{StageStats, UrlRecord, SCHEMA_VERSION};
use crate::Result;

/// URLs eligible for grouping: 2xx HTML pages from `urls.csv`
///
/// Ineligible records are counted in `stats` when given.
pub fn eligible_urls(paths: &ArtifactPaths, mut stats: Option<&mut StageStats>) -> Result<Vec<String>> {
    let path = paths.urls();
    artifact::require(&path, "crawl")?;
    let records: Vec<UrlRecord> = read_csv(&path)?;

    let mut urls = Vec::with_capacity(records.len());
    for record in records {
        if let Some(stats) = stats.as_deref_mut() {
            stats.input += 1;
        }
        let reason = if !record.is_success() {
            Some("non_success_status")
        } else if !record.is_html() {
            Some("non_html")
        } else {
            None
        };
        match (reason, stats.as_deref_mut()) {
            (Some(reason), Some(stats)) => stats.drop_item(reason),
            (Some(_), None) => {}
            (None, _) => urls.push(record.url),
        }
    }
    Ok(urls)
}

/// Loads `templates.json`
pub fn load_templates(paths: &ArtifactPaths) -> Result<TemplateSummary> {
    let path = paths.templates();
    artifact::require(&path, "group")?;
    artifact::read_json(&path)
}

/// Runs the grouping stage for the context's domain
pub fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("group");
    let urls = eligible_urls(&ctx.paths, Some(&mut stats))?;
    tracing::info!("Grouping {} URLs for {}", urls.len(), ctx.domain);

    let parseable: Vec<&str> = urls
        .iter()
        .map(String::as_str)
        .filter(|url| generalize_url(url).is_some())
        .collect();
    for _ in parseable.len()..urls.len() {
        stats.drop_item("unparseable_url");
    }

    let templates = group_urls(parseable.iter().copied(), &ctx.config.templates);
    stats.output = templates.iter().map(|t| t.count as u64).sum();
    // Duplicate rows collapse into one member
    for _ in stats.output..parseable.len() as u64 {
        stats.drop_item("duplicate_url");
    }
    stats.detail("templates", templates.len() as u64);

    for template in templates.iter().take(5) {
        tracing::info!(
            "  {} ({} urls, {}, priority {})",
            template.pattern,
            template.count,
            template.page_type,
            template.priority
        );
    }

    let summary = TemplateSummary {
        schema_version: SCHEMA_VERSION,
        domain: ctx.domain.clone(),
        templates,
    };
    write_json_atomic(&ctx.paths.templates(), &summary)?;
    Ok(stats.finish())
}
