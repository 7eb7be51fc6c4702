//! Versioned record schemas shared by every stage
//!
//! Stages only talk to each other through files holding these records.
//! Each artifact carries [`SCHEMA_VERSION`] in its envelope or statistics
//! file so a reader can reject artifacts written by an incompatible build.

mod catalog;
mod raw;
mod stats;

pub use catalog::{Availability, CatalogCsvRow, CleanRecord};
pub use raw::{DuplicateDecision, FetchMeta, FieldValue, RawRecord, SampleRecord};
pub use stats::StageStats;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of every artifact schema written by this build
pub const SCHEMA_VERSION: u32 = 1;

/// One crawled URL, as written to `urls.csv`
///
/// Immutable once written; keyed by normalized URL. A status of 0 means
/// the transient-failure retry budget was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub url: String,
    pub status_code: u16,
    pub content_type: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

impl UrlRecord {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_html(&self) -> bool {
        self.content_type.is_empty() || self.content_type.contains("html")
    }
}

/// Guessed kind of page behind a URL or template
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    ProductDetail,
    ProductListing,
    SearchResults,
    PaginatedListing,
    Unknown,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductDetail => "product_detail",
            Self::ProductListing => "product_listing",
            Self::SearchResults => "search_results",
            Self::PaginatedListing => "paginated_listing",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_product(&self) -> bool {
        matches!(self, Self::ProductDetail | Self::ProductListing)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product_detail" => Ok(Self::ProductDetail),
            "product_listing" => Ok(Self::ProductListing),
            "search_results" => Ok(Self::SearchResults),
            "paginated_listing" => Ok(Self::PaginatedListing),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown page type '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_string_forms_agree() {
        for page_type in [
            PageType::ProductDetail,
            PageType::ProductListing,
            PageType::SearchResults,
            PageType::PaginatedListing,
            PageType::Unknown,
        ] {
            let json = serde_json::to_string(&page_type).unwrap();
            assert_eq!(json, format!("\"{}\"", page_type.as_str()));
            assert_eq!(page_type.as_str().parse::<PageType>().unwrap(), page_type);
        }
    }

    #[test]
    fn test_url_record_classification() {
        let record = UrlRecord {
            url: "https://example.com/".to_string(),
            status_code: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            size: 10,
            last_modified: None,
        };
        assert!(record.is_success());
        assert!(record.is_html());

        let failed = UrlRecord {
            status_code: 0,
            content_type: "application/pdf".to_string(),
            ..record
        };
        assert!(!failed.is_success());
        assert!(!failed.is_html());
    }
}
