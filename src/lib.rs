//! Catalog-Sieve: a staged crawl-to-clean catalog extractor
//!
//! This crate discovers the URL universe of a single website, generalizes it
//! into URL templates, validates an extraction recipe on a sample, fetches and
//! extracts every page of the approved template, then deduplicates, cleans and
//! loads the resulting catalog. Stages communicate only through versioned file
//! artifacts, so every stage can be re-run or resumed in isolation.

pub mod artifact;
pub mod batch;
pub mod clean;
pub mod config;
pub mod crawler;
pub mod dedupe;
pub mod extract;
pub mod fetcher;
pub mod loader;
pub mod pipeline;
pub mod probe;
pub mod records;
pub mod refresh;
pub mod robots;
pub mod template;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Sieve operations
#[derive(Debug, Error)]
pub enum SieveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetcher::FetchError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] loader::StoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Missing input artifact {path}; run the {stage} stage first")]
    MissingArtifact { stage: String, path: String },

    #[error("Extraction failed for {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("Coverage gate failed for template {template}: {}", failing.join(", "))]
    CoverageGate {
        template: String,
        failing: Vec<String>,
    },

    #[error("No template available: {0}")]
    NoTemplate(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Stage range is empty: {start} runs after {end}")]
    EmptyStageRange { start: String, end: String },

    #[error("Interrupted; progress saved to {0}")]
    Interrupted(String),

    #[error("Manual gate '{gate}' has not been confirmed")]
    GateBlocked { gate: String },

    #[error("Required stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<SieveError>,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid selector '{selector}' for field '{field}'")]
    InvalidSelector { field: String, selector: String },

    #[error("Invalid JSON path '{path}' for field '{field}': {reason}")]
    InvalidPath {
        field: String,
        path: String,
        reason: String,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Catalog-Sieve operations
pub type Result<T> = std::result::Result<T, SieveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use records::{Availability, CleanRecord, PageType, RawRecord, UrlRecord};
pub use url::{extract_domain, normalize_url, SiteScope};
