//! Sample prober
//!
//! Runs the extraction recipe over a small sample of one template's URLs and
//! approves the template for full-scale fetching only when every gated field
//! reaches the coverage threshold. A failed probe is an error, never a
//! warning: `approved.json` is removed and [`SieveError::CoverageGate`] is
//! returned.

mod coverage;

pub use coverage::{compute_coverage, failing_fields, FieldCoverage};

use crate::artifact::{self, write_json_atomic, write_ndjson_atomic};
use crate::extract::Extractor;
use crate::fetcher::{fetch_with_retry, FetchRequest};
use crate::pipeline::StageContext;
use crate::records::{PageType, SampleRecord, StageStats, SCHEMA_VERSION};
use crate::template::{eligible_urls, load_templates, members_of, UrlTemplate};
use crate::{Result, SieveError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contents of `probe_report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub schema_version: u32,
    pub domain: String,
    pub pattern: String,
    pub render: bool,
    pub threshold: f64,
    pub sampled: usize,
    pub fetch_failures: usize,
    pub fields: Vec<FieldCoverage>,
    pub passed: bool,
}

/// Contents of `approved.json`, read by the batch fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub schema_version: u32,
    pub domain: String,
    pub pattern: String,
    pub render: bool,
    pub coverage: BTreeMap<String, f64>,
    pub approved_at: DateTime<Utc>,
}

/// Loads the approval left by a passing probe, if any
pub fn load_approval(ctx: &StageContext) -> Result<Option<Approval>> {
    let path = ctx.paths.approved();
    if !path.exists() {
        return Ok(None);
    }
    artifact::read_json(&path).map(Some)
}

/// Picks the template to probe: `--pattern`, else the top product detail
/// template, else the top product template of any kind
fn choose_template(ctx: &StageContext) -> Result<UrlTemplate> {
    let summary = load_templates(&ctx.paths)?;
    let chosen = match ctx.options.pattern.as_deref() {
        Some(pattern) => summary.find(pattern),
        None => summary
            .top_of_type(PageType::ProductDetail)
            .or_else(|| summary.templates.iter().find(|t| t.page_type.is_product())),
    };
    match (chosen, ctx.options.pattern.as_deref()) {
        (Some(template), _) => Ok(template.clone()),
        (None, Some(pattern)) => Err(SieveError::NoTemplate(format!(
            "pattern '{}' is not in templates.json",
            pattern
        ))),
        (None, None) => Err(SieveError::NoTemplate(
            "no product template found; pass --pattern".to_string(),
        )),
    }
}

/// Runs the probe stage
pub async fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("probe");
    let template = choose_template(ctx)?;
    let recipe = ctx.recipe()?;
    let render = recipe.render;

    let urls = eligible_urls(&ctx.paths, None)?;
    let sample: Vec<String> = members_of(&template.pattern, urls.iter().map(String::as_str))
        .into_iter()
        .take(ctx.config.probe.sample_size)
        .collect();
    if sample.is_empty() {
        return Err(SieveError::NoTemplate(format!(
            "template {} has no eligible URLs",
            template.pattern
        )));
    }
    tracing::info!(
        "Probing {} with {} sampled URLs (render: {})",
        template.pattern,
        sample.len(),
        render
    );

    let fetcher = ctx.page_fetcher(render)?;
    let policy = ctx.retry_policy();
    let gated: Vec<String> = recipe
        .field_set(Some(&template.pattern), template.page_type)
        .gated_fields()
        .iter()
        .map(|f| f.name.clone())
        .collect();
    let extractor = Extractor::new(recipe);

    stats.input = sample.len() as u64;
    let mut samples = Vec::with_capacity(sample.len());
    let mut fetch_failures = 0;
    for url in &sample {
        if ctx.is_stopped() {
            return Err(SieveError::Interrupted(ctx.paths.sample().display().to_string()));
        }
        let request = FetchRequest::new(url.clone());
        let (status, data) = match fetch_with_retry(fetcher.as_ref(), &request, &policy).await {
            Ok(response) if response.is_success() => {
                let content_type = Some(response.content_type.as_str());
                match extractor.extract(url, &response.body, content_type, Utc::now()) {
                    Ok(record) => (response.status, record.extracted_fields),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        (response.status, BTreeMap::new())
                    }
                }
            }
            Ok(response) => {
                tracing::warn!("Sample fetch of {} returned HTTP {}", url, response.status);
                fetch_failures += 1;
                (response.status, BTreeMap::new())
            }
            Err(e) => {
                tracing::warn!("Sample fetch failed: {}", e);
                fetch_failures += 1;
                (0, BTreeMap::new())
            }
        };
        samples.push(SampleRecord {
            url: url.clone(),
            timestamp: Utc::now(),
            status,
            data,
        });
    }
    write_ndjson_atomic(&ctx.paths.sample(), &samples)?;

    let threshold = ctx.config.probe.coverage_threshold;
    let fields = compute_coverage(&samples, &gated, threshold);
    let failing = failing_fields(&fields);
    let passed = failing.is_empty();
    for field in &fields {
        tracing::info!(
            "  {:<16} {:>3}/{:<3} {:>5.1}% {}",
            field.field,
            field.hits,
            field.total,
            field.coverage * 100.0,
            if field.passed { "ok" } else { "BELOW THRESHOLD" }
        );
    }

    let report = ProbeReport {
        schema_version: SCHEMA_VERSION,
        domain: ctx.domain.clone(),
        pattern: template.pattern.clone(),
        render,
        threshold,
        sampled: samples.len(),
        fetch_failures,
        fields: fields.clone(),
        passed,
    };
    write_json_atomic(&ctx.paths.probe_report(), &report)?;

    let approved_path = ctx.paths.approved();
    if !passed {
        if approved_path.exists() {
            std::fs::remove_file(&approved_path)?;
        }
        tracing::error!("Probe of {} failed on: {}", template.pattern, failing.join(", "));
        return Err(SieveError::CoverageGate {
            template: template.pattern,
            failing,
        });
    }

    let approval = Approval {
        schema_version: SCHEMA_VERSION,
        domain: ctx.domain.clone(),
        pattern: template.pattern.clone(),
        render,
        coverage: fields.iter().map(|f| (f.field.clone(), f.coverage)).collect(),
        approved_at: Utc::now(),
    };
    write_json_atomic(&approved_path, &approval)?;
    tracing::info!("Approved {} for full-scale fetching", template.pattern);

    stats.output = (samples.len() - fetch_failures) as u64;
    for _ in 0..fetch_failures {
        stats.drop_item("fetch_failed");
    }
    stats.detail("pattern", template.pattern);
    stats.detail("coverage", serde_json::to_value(&approval.coverage)?);
    Ok(stats.finish())
}
