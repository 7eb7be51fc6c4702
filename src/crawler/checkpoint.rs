//! Durable crawl state
//!
//! The checkpoint is owned by a single crawl process, written atomically at
//! a fixed page interval and on termination, and deleted once the crawl
//! completes.

use crate::artifact::{read_json, write_json_atomic};
use crate::crawler::adaptive::AdaptiveSnapshot;
use crate::records::{UrlRecord, SCHEMA_VERSION};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub schema_version: u32,
    pub domain: String,
    pub visited: BTreeSet<String>,
    pub frontier: VecDeque<String>,
    pub url_metadata: BTreeMap<String, UrlRecord>,
    pub pages_crawled: u64,
    /// Reason -> count of visited URLs that were not fetched
    #[serde(default)]
    pub skipped: BTreeMap<String, u64>,
    #[serde(default)]
    pub adaptive: AdaptiveSnapshot,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn new(domain: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            domain: domain.to_string(),
            visited: BTreeSet::new(),
            frontier: VecDeque::new(),
            url_metadata: BTreeMap::new(),
            pages_crawled: 0,
            skipped: BTreeMap::new(),
            adaptive: AdaptiveSnapshot::default(),
            saved_at: Utc::now(),
        }
    }

    /// Loads the checkpoint at `path`, if one exists
    ///
    /// A checkpoint written for another domain or schema version is ignored
    /// with a warning.
    pub fn load(path: &Path, domain: &str) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let state: Self = read_json(path)?;
        if state.schema_version != SCHEMA_VERSION || state.domain != domain {
            tracing::warn!(
                "Ignoring checkpoint {} (domain {}, schema v{})",
                path.display(),
                state.domain,
                state.schema_version
            );
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Persists the state with write-then-rename
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.saved_at = Utc::now();
        write_json_atomic(path, self)?;
        tracing::debug!(
            "Checkpoint saved: {} visited, {} queued",
            self.visited.len(),
            self.frontier.len()
        );
        Ok(())
    }

    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> CheckpointState {
        let mut state = CheckpointState::new("shop.example");
        state.visited.insert("https://shop.example/".to_string());
        state.frontier.push_back("https://shop.example/b".to_string());
        state.frontier.push_back("https://shop.example/a".to_string());
        state.url_metadata.insert(
            "https://shop.example/".to_string(),
            UrlRecord {
                url: "https://shop.example/".to_string(),
                status_code: 200,
                content_type: "text/html".to_string(),
                size: 120,
                last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string()),
            },
        );
        state.pages_crawled = 1;
        state
    }

    #[test]
    fn test_save_and_restore_exactly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.checkpoint.json");
        let mut state = sample_state();
        state.save(&path).unwrap();

        let restored = CheckpointState::load(&path, "shop.example").unwrap().unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.frontier.front().map(String::as_str), Some("https://shop.example/b"));
    }

    #[test]
    fn test_other_domain_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.checkpoint.json");
        sample_state().save(&path).unwrap();
        assert!(CheckpointState::load(&path, "other.example").unwrap().is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.checkpoint.json");
        sample_state().save(&path).unwrap();
        CheckpointState::remove(&path).unwrap();
        CheckpointState::remove(&path).unwrap();
        assert!(!path.exists());
    }
}
