//! Stage orchestration
//!
//! This module handles:
//! - The [`StageContext`] every stage receives
//! - The ordered stage table and the [`Stage`] trait
//! - Full, ranged, skip-list and refresh-only runs
//! - Manual gates, which block a run until a human confirms them

mod context;
mod stages;

pub use context::{StageContext, StageOptions};
pub use stages::{pipeline_stages, stage_by_name, Stage, SyncStage};

use crate::artifact::{write_json_atomic, write_stats};
use crate::records::{StageStats, SCHEMA_VERSION};
use crate::{Result, SieveError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every stage name accepted on the command line, in pipeline order
pub const STAGE_NAMES: &[&str] = &[
    "crawl", "group", "probe", "fetch", "extract", "dedupe", "clean", "load", "refresh",
];

/// Which part of the pipeline to run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub start: Option<String>,
    pub end: Option<String>,
    pub skip: Vec<String>,
    /// Run only the refresher
    pub refresh: bool,
    /// Manual gates confirmed for this run
    pub confirmed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
    Skipped,
}

/// What happened to one stage during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: String,
    pub status: StageStatus,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Contents of `run_summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub domain: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageOutcome>,
    /// Gate that stopped the run, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<String>,
}

/// Runs one stage and writes its statistics file
pub async fn run_stage(stage: &dyn Stage, ctx: &StageContext) -> Result<StageStats> {
    tracing::info!("[{}] starting for {}", stage.name(), ctx.domain);
    let stats = stage.run(ctx).await?;
    write_stats(&ctx.paths, &stats)?;
    if !stats.is_accounted() {
        tracing::warn!(
            "[{}] accounting mismatch: input={} output={} dropped={}",
            stats.stage,
            stats.input,
            stats.output,
            stats.dropped_total()
        );
    }
    Ok(stats)
}

/// Runs a single stage by name
pub async fn run_named(name: &str, ctx: &StageContext) -> Result<StageStats> {
    let stage = stage_by_name(name).ok_or_else(|| SieveError::UnknownStage(name.to_string()))?;
    run_stage(stage, ctx).await
}

fn position(stages: &[&'static dyn Stage], name: &str) -> Result<usize> {
    stages
        .iter()
        .position(|s| s.name() == name)
        .ok_or_else(|| SieveError::UnknownStage(name.to_string()))
}

/// The stages a run will consider, in order
///
/// # Arguments
///
/// * `options` - Range, skip-list and refresh selection
///
/// # Returns
///
/// * `Ok(Vec<&dyn Stage>)` - Selected stages; skipped ones are included and
///   reported as skipped by the run
/// * `Err(SieveError::UnknownStage)` - A name does not match any stage
/// * `Err(SieveError::EmptyStageRange)` - `start` comes after `end`
pub fn select_stages(options: &RunOptions) -> Result<Vec<&'static dyn Stage>> {
    for name in &options.skip {
        if !STAGE_NAMES.contains(&name.as_str()) {
            return Err(SieveError::UnknownStage(name.clone()));
        }
    }
    if options.refresh {
        return Ok(stage_by_name("refresh").into_iter().collect());
    }

    let stages = pipeline_stages();
    let start = match &options.start {
        Some(name) => position(&stages, name)?,
        None => 0,
    };
    let end = match &options.end {
        Some(name) => position(&stages, name)?,
        None => stages.len() - 1,
    };
    if start > end {
        return Err(SieveError::EmptyStageRange {
            start: stages[start].name().to_string(),
            end: stages[end].name().to_string(),
        });
    }
    Ok(stages[start..=end].to_vec())
}

fn gate_confirmed(ctx: &StageContext, options: &RunOptions, gate: &str) -> bool {
    options.confirmed.iter().any(|g| g == gate) || ctx.paths.gate_marker(gate).exists()
}

/// Runs the selected stages in order
///
/// A required stage's failure halts the run with [`SieveError::StageFailed`];
/// an optional stage's failure is logged and the run continues. An
/// unconfirmed gate placed after a completed stage stops the run with
/// [`SieveError::GateBlocked`]. `run_summary.json` is written in every case.
pub async fn run_pipeline(ctx: &StageContext, options: &RunOptions) -> Result<RunSummary> {
    let selected = select_stages(options)?;
    let mut summary = RunSummary {
        schema_version: SCHEMA_VERSION,
        domain: ctx.domain.clone(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
        stages: Vec::with_capacity(selected.len()),
        blocked_at: None,
    };
    tracing::info!(
        "Running {} stages for {}: {}",
        selected.len(),
        ctx.domain,
        selected.iter().map(|s| s.name()).collect::<Vec<_>>().join(" -> ")
    );

    let mut failure: Option<SieveError> = None;
    for (index, stage) in selected.iter().enumerate() {
        let name = stage.name();
        if options.skip.iter().any(|s| s == name) {
            tracing::info!("[{}] skipped", name);
            summary.stages.push(StageOutcome {
                stage: name.to_string(),
                status: StageStatus::Skipped,
                required: stage.required(),
                input: None,
                output: None,
                error: None,
            });
            continue;
        }

        match run_stage(*stage, ctx).await {
            Ok(stats) => summary.stages.push(StageOutcome {
                stage: name.to_string(),
                status: StageStatus::Completed,
                required: stage.required(),
                input: Some(stats.input),
                output: Some(stats.output),
                error: None,
            }),
            Err(e) => {
                summary.stages.push(StageOutcome {
                    stage: name.to_string(),
                    status: StageStatus::Failed,
                    required: stage.required(),
                    input: None,
                    output: None,
                    error: Some(e.to_string()),
                });
                if stage.required() {
                    tracing::error!("[{}] required stage failed: {}", name, e);
                    failure = Some(SieveError::StageFailed {
                        stage: name.to_string(),
                        source: Box::new(e),
                    });
                    break;
                }
                tracing::warn!("[{}] optional stage failed, continuing: {}", name, e);
                continue;
            }
        }

        if index + 1 == selected.len() {
            continue;
        }
        let blocking = ctx
            .config
            .gates
            .iter()
            .filter(|g| g.after_stage == name)
            .find(|g| !gate_confirmed(ctx, options, &g.name));
        if let Some(gate) = blocking {
            tracing::warn!(
                "Gate '{}' after {} is not confirmed{}; pass --confirm {} or create {}",
                gate.name,
                name,
                gate.description
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default(),
                gate.name,
                ctx.paths.gate_marker(&gate.name).display()
            );
            summary.blocked_at = Some(gate.name.clone());
            failure = Some(SieveError::GateBlocked {
                gate: gate.name.clone(),
            });
            break;
        }
    }

    summary.finished_at = Utc::now();
    write_json_atomic(&ctx.paths.run_summary(), &summary)?;
    match failure {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}
