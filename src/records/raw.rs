use crate::records::PageType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An extracted field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(n) => !n.is_finite(),
            Self::List(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }

    /// Text form of the value; lists yield their first non-empty item
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::List(items) => items.iter().find(|s| !s.trim().is_empty()).cloned(),
        }
    }

    /// List form of the value; scalars become a one-item list
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            other => other.as_text().into_iter().collect(),
        }
    }
}

/// Metadata line written by the batch fetcher for every attempted URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMeta {
    pub url: String,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
    /// Content-addressed body location, relative to the domain directory
    pub file_path: Option<String>,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub rendered: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl FetchMeta {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.file_path.is_some()
    }
}

/// One sampled page written by the sample prober
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub data: BTreeMap<String, FieldValue>,
}

/// Field-level record produced by the extractor, one per fetched page
///
/// `extracted_data` may be empty when every selector failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub url: String,
    pub page_type: PageType,
    pub timestamp_fetched: DateTime<Utc>,
    pub timestamp_parsed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
    #[serde(rename = "extracted_data", default)]
    pub extracted_fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.extracted_fields.get(name).filter(|v| !v.is_empty())
    }

    pub fn field_text(&self, name: &str) -> Option<String> {
        self.field(name).and_then(FieldValue::as_text)
    }

    pub fn non_empty_field_count(&self) -> usize {
        self.extracted_fields.values().filter(|v| !v.is_empty()).count()
    }
}

/// Audit entry for one collapsed duplicate; never deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDecision {
    pub identity_key: String,
    pub kept_record: RawRecord,
    pub discarded_record: RawRecord,
    pub rationale: String,
}
