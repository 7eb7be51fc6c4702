//! Template drift detection

use crate::template::generalize_url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A systematic move of one template's URLs to a new path structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMapping {
    pub old_pattern: String,
    pub new_pattern: String,
    /// Sampled members that answered with a 2xx page
    pub sampled: usize,
    /// Sampled members whose final URL generalizes to `new_pattern`
    pub moved: usize,
}

/// Compares the final URLs of a template's sampled members to the template
///
/// # Arguments
///
/// * `old_pattern` - The known template
/// * `final_urls` - Post-redirect URLs of the members that answered 2xx
/// * `threshold` - Fraction of the sample that must land on one new template
///
/// # Returns
///
/// The old-to-new mapping when a single new template reaches the threshold.
pub fn detect_drift(old_pattern: &str, final_urls: &[String], threshold: f64) -> Option<TemplateMapping> {
    if final_urls.is_empty() {
        return None;
    }

    let mut targets: BTreeMap<String, usize> = BTreeMap::new();
    for url in final_urls {
        match generalize_url(url) {
            Some(pattern) if pattern != old_pattern => *targets.entry(pattern).or_insert(0) += 1,
            _ => {}
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (pattern, count) in targets {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((pattern, count));
        }
    }

    let (new_pattern, moved) = best?;
    let share = moved as f64 / final_urls.len() as f64;
    if share >= threshold {
        Some(TemplateMapping {
            old_pattern: old_pattern.to_string(),
            new_pattern,
            sampled: final_urls.len(),
            moved,
        })
    } else {
        None
    }
}
