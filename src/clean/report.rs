use crate::records::{CleanRecord, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub records_with_images: usize,
    pub total_images: usize,
    pub mean_per_record: f64,
}

/// Contents of `validation_report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub schema_version: u32,
    pub domain: String,
    pub input: usize,
    pub output: usize,
    /// Hard validation errors, reason -> dropped records
    pub dropped: BTreeMap<String, u64>,
    /// Soft warnings, kind -> occurrences
    pub warnings: BTreeMap<String, u64>,
    /// Field -> fraction of clean records carrying it
    pub field_coverage: BTreeMap<String, f64>,
    pub price: Option<PriceSummary>,
    pub images: ImageSummary,
}

impl ValidationReport {
    pub fn new(domain: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            domain: domain.to_string(),
            input: 0,
            output: 0,
            dropped: BTreeMap::new(),
            warnings: BTreeMap::new(),
            field_coverage: BTreeMap::new(),
            price: None,
            images: ImageSummary {
                records_with_images: 0,
                total_images: 0,
                mean_per_record: 0.0,
            },
        }
    }

    pub fn warn(&mut self, kind: &str) {
        *self.warnings.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Fills coverage, price and image figures from the clean catalog
    pub fn summarize(&mut self, records: &[CleanRecord]) {
        self.output = records.len();
        let total = records.len().max(1) as f64;

        let counts: [(&str, usize); 11] = [
            ("url", records.iter().filter(|r| !r.url.is_empty()).count()),
            ("title", records.len()),
            ("price", records.iter().filter(|r| r.price.is_some()).count()),
            ("description", records.iter().filter(|r| r.description.is_some()).count()),
            ("images", records.iter().filter(|r| !r.images.is_empty()).count()),
            ("category", records.iter().filter(|r| r.category.is_some()).count()),
            ("brand", records.iter().filter(|r| r.brand.is_some()).count()),
            ("sku", records.iter().filter(|r| r.sku.is_some()).count()),
            ("availability", records.iter().filter(|r| r.availability.is_some()).count()),
            ("rating", records.iter().filter(|r| r.rating.is_some()).count()),
            ("reviews_count", records.iter().filter(|r| r.reviews_count.is_some()).count()),
        ];
        self.field_coverage = if records.is_empty() {
            BTreeMap::new()
        } else {
            counts
                .iter()
                .map(|(field, count)| (field.to_string(), *count as f64 / total))
                .collect()
        };

        let mut prices: Vec<f64> = records.iter().filter_map(|r| r.price).collect();
        prices.sort_by(|a, b| a.total_cmp(b));
        self.price = price_summary(&prices);

        let total_images: usize = records.iter().map(|r| r.images.len()).sum();
        self.images = ImageSummary {
            records_with_images: records.iter().filter(|r| !r.images.is_empty()).count(),
            total_images,
            mean_per_record: total_images as f64 / total,
        };
    }
}

fn price_summary(sorted: &[f64]) -> Option<PriceSummary> {
    let (first, last) = (sorted.first()?, sorted.last()?);
    let count = sorted.len();
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };
    Some(PriceSummary {
        count,
        min: *first,
        max: *last,
        mean: sorted.iter().sum::<f64>() / count as f64,
        median,
    })
}
