//! Per-stage statistics artifact
//!
//! No stage may lose records silently: every stage writes one of these,
//! accounting for its input, its output, and a reason for every dropped or
//! skipped item.

use crate::records::SCHEMA_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub schema_version: u32,
    pub stage: String,
    pub domain: String,
    pub input: u64,
    pub output: u64,

    /// Reason -> number of items dropped or skipped for that reason
    pub dropped: BTreeMap<String, u64>,

    /// Stage-specific figures (coverage, status histogram, ...)
    #[serde(default)]
    pub details: BTreeMap<String, Value>,

    pub finished_at: DateTime<Utc>,
}

impl StageStats {
    pub fn new(stage: &str, domain: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            stage: stage.to_string(),
            domain: domain.to_string(),
            input: 0,
            output: 0,
            dropped: BTreeMap::new(),
            details: BTreeMap::new(),
            finished_at: Utc::now(),
        }
    }

    /// Counts one dropped item under `reason`
    pub fn drop_item(&mut self, reason: &str) {
        *self.dropped.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }

    pub fn detail(&mut self, key: &str, value: impl Into<Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    /// True when every input item is either output or dropped with a reason
    pub fn is_accounted(&self) -> bool {
        self.input == self.output + self.dropped_total()
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}
