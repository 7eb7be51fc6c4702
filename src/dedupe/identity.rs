//! Identity keys
//!
//! A key is prefixed with the tier that produced it (`id:`, `title_price:`,
//! `url:`, `content:`) so keys from different tiers can never collide.

use crate::config::DedupeStrategy;
use crate::records::RawRecord;
use crate::url::normalize_url_lossy;
use sha2::{Digest, Sha256};

/// Fields holding a source identifier, in order of preference
const ID_FIELDS: &[&str] = &["sku", "id", "product_id"];

/// Computes the identity key of `record` under `strategy`
///
/// `auto` tries an explicit id/sku, then a title+price hash, then the
/// normalized URL, then a hash of all fields. The single-tier strategies
/// fall back to the normalized URL when their tier yields nothing, so every
/// record gets a key.
pub fn identity_key(record: &RawRecord, strategy: DedupeStrategy) -> String {
    let key = match strategy {
        DedupeStrategy::Id => id_key(record),
        DedupeStrategy::Content => content_key(record),
        DedupeStrategy::Url => url_key(record),
        DedupeStrategy::Auto => id_key(record)
            .or_else(|| title_price_key(record))
            .or_else(|| url_key(record))
            .or_else(|| content_key(record)),
    };
    key.or_else(|| url_key(record))
        .unwrap_or_else(|| format!("url:{}", record.url))
}

fn id_key(record: &RawRecord) -> Option<String> {
    ID_FIELDS
        .iter()
        .find_map(|field| record.field_text(field))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(|id| format!("id:{}", id))
}

fn title_price_key(record: &RawRecord) -> Option<String> {
    let title = record.field_text("title")?;
    let price = record.field_text("price")?;
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if title.is_empty() {
        return None;
    }
    Some(format!("title_price:{}", digest(&format!("{}|{}", title, price.trim()))))
}

fn url_key(record: &RawRecord) -> Option<String> {
    let url = record.url.trim();
    (!url.is_empty()).then(|| format!("url:{}", normalize_url_lossy(url)))
}

fn content_key(record: &RawRecord) -> Option<String> {
    let fields: Vec<(&String, _)> = record
        .extracted_fields
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .collect();
    if fields.is_empty() {
        return None;
    }
    let canonical = serde_json::to_string(&fields).ok()?;
    Some(format!("content:{}", digest(&canonical)))
}

fn digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
