//! Deduplicator
//!
//! Collapses records sharing an identity key. The unique set keeps the
//! first-seen position of every key; a later record replaces the kept one
//! only when it has strictly more non-empty fields, or as many fields and a
//! later parse timestamp. Every collapse is written to the audit stream.
//!
//! Deduplicating the unique output again changes nothing: its keys are
//! already distinct.

mod identity;

pub use identity::identity_key;

use crate::artifact::{self, read_ndjson, write_ndjson_atomic};
use crate::config::DedupeStrategy;
use crate::pipeline::StageContext;
use crate::records::{DuplicateDecision, RawRecord, StageStats};
use crate::Result;
use std::collections::{BTreeMap, HashMap};

/// Result of one deduplication pass
#[derive(Debug, Clone, PartialEq)]
pub struct DedupeOutcome {
    pub unique: Vec<RawRecord>,
    pub duplicates: Vec<DuplicateDecision>,
}

/// Decides whether `candidate` replaces `kept`, with the rationale
fn resolve(kept: &RawRecord, candidate: &RawRecord) -> (bool, String) {
    let kept_fields = kept.non_empty_field_count();
    let candidate_fields = candidate.non_empty_field_count();
    if candidate_fields != kept_fields {
        let replace = candidate_fields > kept_fields;
        let (winner, loser) = if replace {
            (candidate_fields, kept_fields)
        } else {
            (kept_fields, candidate_fields)
        };
        return (
            replace,
            format!("kept record with more non-empty fields ({} > {})", winner, loser),
        );
    }
    if candidate.timestamp_parsed > kept.timestamp_parsed {
        return (
            true,
            format!(
                "equal field count ({}); kept later record ({})",
                kept_fields,
                candidate.timestamp_parsed.to_rfc3339()
            ),
        );
    }
    (
        false,
        format!("equal field count ({}); kept earlier or first-seen record", kept_fields),
    )
}

/// Deduplicates `records` under `strategy`
pub fn deduplicate(records: Vec<RawRecord>, strategy: DedupeStrategy) -> DedupeOutcome {
    let mut unique: Vec<RawRecord> = Vec::with_capacity(records.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();

    for record in records {
        let key = identity_key(&record, strategy);
        match positions.get(&key) {
            Some(&position) => {
                let (replace, rationale) = resolve(&unique[position], &record);
                let (kept, discarded) = if replace {
                    let previous = std::mem::replace(&mut unique[position], record);
                    (unique[position].clone(), previous)
                } else {
                    (unique[position].clone(), record)
                };
                tracing::debug!("Duplicate {}: {}", key, rationale);
                duplicates.push(DuplicateDecision {
                    identity_key: key,
                    kept_record: kept,
                    discarded_record: discarded,
                    rationale,
                });
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }
    }

    DedupeOutcome { unique, duplicates }
}

/// Runs the dedupe stage over `extracted.ndjson`
pub fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("dedupe");
    let input = ctx.paths.extracted();
    artifact::require(&input, "extract")?;
    let records: Vec<RawRecord> = read_ndjson(&input)?;
    stats.input = records.len() as u64;

    let strategy = ctx.options.strategy.unwrap_or(ctx.config.dedupe.strategy);
    tracing::info!(
        "Deduplicating {} records for {} with strategy {:?}",
        records.len(),
        ctx.domain,
        strategy
    );

    let outcome = deduplicate(records, strategy);
    write_ndjson_atomic(&ctx.paths.unique(), &outcome.unique)?;
    write_ndjson_atomic(&ctx.paths.duplicates(), &outcome.duplicates)?;

    let mut tiers: BTreeMap<String, u64> = BTreeMap::new();
    for record in &outcome.unique {
        let key = identity_key(record, strategy);
        let tier = key.split(':').next().unwrap_or_default().to_string();
        *tiers.entry(tier).or_insert(0) += 1;
    }

    stats.output = outcome.unique.len() as u64;
    for _ in &outcome.duplicates {
        stats.drop_item("duplicate");
    }
    stats.detail("strategy", format!("{:?}", strategy).to_lowercase());
    stats.detail("key_tiers", serde_json::to_value(&tiers)?);
    Ok(stats.finish())
}
