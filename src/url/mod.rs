//! URL handling module for Catalog-Sieve
//!
//! This module provides URL normalization, domain extraction, wildcard
//! matching, and the site scope used by the crawler.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, site_root, SiteScope};
pub use matcher::matches_wildcard;
pub use normalize::{normalize_url, normalize_url_lossy, strip_tracking_params};
