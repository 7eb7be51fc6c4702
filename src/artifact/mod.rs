//! File artifacts exchanged between stages
//!
//! This module handles:
//! - The per-domain directory layout ([`ArtifactPaths`])
//! - Atomic whole-file writes (write to a temporary file, then rename)
//! - Newline-delimited JSON streams, CSV tables and JSON documents
//! - Per-stage statistics files

mod atomic;
mod ndjson;
mod paths;
mod table;

pub use atomic::{write_atomic, write_json_atomic};
pub use ndjson::{read_ndjson, write_ndjson_atomic, NdjsonAppender};
pub use paths::ArtifactPaths;
pub use table::{read_csv, write_csv_atomic};

use crate::records::StageStats;
use crate::{Result, SieveError};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Reads a whole-file JSON artifact
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Fails with [`SieveError::MissingArtifact`] when an input artifact is absent
pub fn require(path: &Path, producing_stage: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(SieveError::MissingArtifact {
            stage: producing_stage.to_string(),
            path: path.display().to_string(),
        })
    }
}

/// Writes a stage's statistics file and logs its accounting
pub fn write_stats(paths: &ArtifactPaths, stats: &StageStats) -> Result<()> {
    let path = paths.stats(&stats.stage);
    write_json_atomic(&path, stats)?;
    tracing::info!(
        "[{}] input={} output={} dropped={} -> {}",
        stats.stage,
        stats.input,
        stats.output,
        stats.dropped_total(),
        path.display()
    );
    Ok(())
}

/// Reads a stage's statistics file, if the stage has run
pub fn read_stats(paths: &ArtifactPaths, stage: &str) -> Result<Option<StageStats>> {
    let path = paths.stats(stage);
    if !path.exists() {
        return Ok(None);
    }
    read_json(&path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stats_round_trip_through_layout() {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "example.com");

        let mut stats = StageStats::new("dedupe", "example.com");
        stats.input = 3;
        stats.output = 2;
        stats.drop_item("duplicate");
        write_stats(&paths, &stats).unwrap();

        let loaded = read_stats(&paths, "dedupe").unwrap().unwrap();
        assert_eq!(loaded, stats);
        assert!(read_stats(&paths, "clean").unwrap().is_none());
    }

    #[test]
    fn test_require_reports_producing_stage() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("urls.csv");
        match require(&missing, "crawl") {
            Err(SieveError::MissingArtifact { stage, .. }) => assert_eq!(stage, "crawl"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
