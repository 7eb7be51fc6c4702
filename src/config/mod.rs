//! Configuration module for Catalog-Sieve
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! file and the typed extraction recipe.
//!
//! # Example
//!
//! ```no_run
//! use catalog_sieve::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("catalog-sieve.toml")).unwrap();
//! println!("Checkpoint every {} pages", config.crawler.checkpoint_interval);
//! ```

mod parser;
pub mod recipe;
mod types;
mod validation;

// Re-export types
pub use recipe::{FieldKind, FieldRule, FieldSet, Recipe};
pub use types::{
    AdaptiveConfig, CleanConfig, Config, CrawlMode, CrawlerConfig, DedupeConfig, DedupeStrategy,
    FetchConfig, GateConfig, IdentityProfile, LoaderBackend, LoaderConfig, PathsConfig,
    ProbeConfig, RefreshConfig, SiteConfig, TemplateConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
