use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stock availability, a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
    LimitedStock,
    Preorder,
    Unknown,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::OutOfStock => "out_of_stock",
            Self::LimitedStock => "limited_stock",
            Self::Preorder => "preorder",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal, externally consumed catalog entity
///
/// Always carries a non-empty `title` and at least one of `url` / `sku`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<u32>,
    pub timestamp_fetched: DateTime<Utc>,
    pub timestamp_parsed: DateTime<Utc>,
}

/// Flat CSV form of a [`CleanRecord`]; images are joined with `|`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCsvRow {
    pub url: String,
    pub title: String,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub images: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub availability: Option<String>,
    pub rating: Option<f64>,
    pub reviews_count: Option<u32>,
    pub timestamp_fetched: String,
    pub timestamp_parsed: String,
}

impl From<&CleanRecord> for CatalogCsvRow {
    fn from(record: &CleanRecord) -> Self {
        Self {
            url: record.url.clone(),
            title: record.title.clone(),
            price: record.price,
            description: record.description.clone(),
            images: record.images.join("|"),
            category: record.category.clone(),
            brand: record.brand.clone(),
            sku: record.sku.clone(),
            availability: record.availability.map(|a| a.as_str().to_string()),
            rating: record.rating,
            reviews_count: record.reviews_count,
            timestamp_fetched: record.timestamp_fetched.to_rfc3339(),
            timestamp_parsed: record.timestamp_parsed.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Availability::OutOfStock).unwrap(),
            "\"out_of_stock\""
        );
        assert_eq!(Availability::LimitedStock.to_string(), "limited_stock");
    }

    #[test]
    fn test_csv_row_joins_images() {
        let now = Utc::now();
        let record = CleanRecord {
            url: "https://example.com/p/1".to_string(),
            title: "Widget".to_string(),
            price: Some(9.99),
            description: None,
            images: vec!["https://example.com/a.jpg".to_string(), "https://example.com/b.jpg".to_string()],
            category: None,
            brand: None,
            sku: None,
            availability: Some(Availability::InStock),
            rating: None,
            reviews_count: None,
            timestamp_fetched: now,
            timestamp_parsed: now,
        };
        let row = CatalogCsvRow::from(&record);
        assert_eq!(row.images, "https://example.com/a.jpg|https://example.com/b.jpg");
        assert_eq!(row.availability.as_deref(), Some("in_stock"));
    }
}
