use crate::records::SampleRecord;
use serde::{Deserialize, Serialize};

/// Coverage of one field over the sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCoverage {
    pub field: String,
    pub hits: usize,
    pub total: usize,
    pub coverage: f64,
    pub passed: bool,
}

/// Computes per-field coverage over sampled pages
///
/// Every sampled page counts in the denominator, including pages whose
/// fetch failed. An empty sample covers nothing.
///
/// # Arguments
///
/// * `samples` - The sampled pages with their extracted data
/// * `fields` - The fields taking part in the gate
/// * `threshold` - Minimum coverage in `[0, 1]`
pub fn compute_coverage(
    samples: &[SampleRecord],
    fields: &[String],
    threshold: f64,
) -> Vec<FieldCoverage> {
    let total = samples.len();
    fields
        .iter()
        .map(|field| {
            let hits = samples
                .iter()
                .filter(|s| s.data.get(field).map_or(false, |v| !v.is_empty()))
                .count();
            let coverage = if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            };
            FieldCoverage {
                field: field.clone(),
                hits,
                total,
                coverage,
                passed: total > 0 && coverage >= threshold,
            }
        })
        .collect()
}

/// Names of the fields below threshold
pub fn failing_fields(coverage: &[FieldCoverage]) -> Vec<String> {
    coverage
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.field.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FieldValue;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample(with_price: bool) -> SampleRecord {
        let mut data = BTreeMap::new();
        data.insert("title".to_string(), FieldValue::Text("Widget".to_string()));
        if with_price {
            data.insert("price".to_string(), FieldValue::Number(9.5));
        }
        SampleRecord {
            url: "https://shop.example/product/widget".to_string(),
            timestamp: Utc::now(),
            status: 200,
            data,
        }
    }

    #[test]
    fn test_price_on_five_of_thirty_fails() {
        let samples: Vec<SampleRecord> = (0..30).map(|i| sample(i < 5)).collect();
        let fields = vec!["title".to_string(), "price".to_string()];
        let coverage = compute_coverage(&samples, &fields, 0.9);

        assert_eq!(coverage[0].coverage, 1.0);
        assert!(coverage[0].passed);
        assert_eq!(coverage[1].hits, 5);
        assert!((coverage[1].coverage - 5.0 / 30.0).abs() < 1e-9);
        assert!(!coverage[1].passed);
        assert_eq!(failing_fields(&coverage), vec!["price".to_string()]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let samples: Vec<SampleRecord> = (0..10).map(|i| sample(i < 9)).collect();
        let coverage = compute_coverage(&samples, &["price".to_string()], 0.9);
        assert!(coverage[0].passed);
    }

    #[test]
    fn test_empty_sample_fails() {
        let coverage = compute_coverage(&[], &["title".to_string()], 0.0);
        assert!(!coverage[0].passed);
    }
}
