//! Cleaner / validator
//!
//! Turns unique raw records into catalog records. Cleaning one record is a
//! pure function of that record and the cleaning configuration: no clock,
//! no network, no shared state.
//!
//! Hard errors drop the record with a reason: a missing or out-of-bounds
//! title, no URL and no SKU, or a missing price when prices are required.
//! Everything else is a soft warning counted in `validation_report.json`
//! and not persisted with the record.

mod availability;
mod fields;
mod report;

pub use availability::classify_availability;
pub use fields::{
    clean_category, clean_description, clean_images, clean_price, clean_rating,
    clean_reviews_count, clean_text, clean_title, DescriptionCheck, PriceCheck, TitleCheck,
};
pub use report::{ImageSummary, PriceSummary, ValidationReport};

use crate::artifact::{self, read_ndjson, write_csv_atomic, write_json_atomic, write_ndjson_atomic};
use crate::config::CleanConfig;
use crate::pipeline::StageContext;
use crate::records::{CatalogCsvRow, CleanRecord, RawRecord, StageStats};
use crate::url::normalize_url_lossy;
use crate::Result;
use std::collections::HashSet;
use url::Url;

/// Why a record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingTitle,
    InvalidTitle,
    MissingIdentity,
    MissingPrice,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::InvalidTitle => "invalid_title",
            Self::MissingIdentity => "missing_url_and_sku",
            Self::MissingPrice => "missing_price",
        }
    }
}

/// A cleaned record with the soft warnings raised while cleaning it
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    pub record: CleanRecord,
    pub warnings: Vec<&'static str>,
}

/// Cleans and validates one raw record
///
/// # Arguments
///
/// * `raw` - A unique record from the deduplicator
/// * `config` - Cleaning options (image base URL, price requirement, category separator)
///
/// # Returns
///
/// * `Ok(Cleaned)` - The catalog record and its soft warnings
/// * `Err(Rejection)` - A hard validation error; the record is dropped
pub fn clean_record(raw: &RawRecord, config: &CleanConfig) -> std::result::Result<Cleaned, Rejection> {
    let mut warnings = Vec::new();

    let title = match clean_title(raw.field_text("title").as_deref()) {
        TitleCheck::Valid(title) => title,
        TitleCheck::Missing => return Err(Rejection::MissingTitle),
        TitleCheck::OutOfBounds(_) => return Err(Rejection::InvalidTitle),
    };

    let url = if raw.url.trim().is_empty() {
        String::new()
    } else {
        normalize_url_lossy(&raw.url)
    };
    let sku = clean_text(raw.field_text("sku").as_deref())
        .or_else(|| clean_text(raw.field_text("id").as_deref()));
    if url.is_empty() && sku.is_none() {
        return Err(Rejection::MissingIdentity);
    }

    let price = match clean_price(raw.field("price")) {
        PriceCheck::Valid(price) => Some(price),
        PriceCheck::Missing => {
            warnings.push("missing_price");
            None
        }
        PriceCheck::Unparseable => {
            warnings.push("unparseable_price");
            None
        }
        PriceCheck::OutOfRange(_) => {
            warnings.push("price_out_of_range");
            None
        }
    };
    if price.is_none() && config.price_required {
        return Err(Rejection::MissingPrice);
    }

    let description = match clean_description(raw.field_text("description").as_deref()) {
        DescriptionCheck::Valid { text, truncated } => {
            if truncated {
                warnings.push("description_truncated");
            }
            Some(text)
        }
        DescriptionCheck::TooShort => {
            warnings.push("short_description");
            None
        }
        DescriptionCheck::Missing => None,
    };

    let base = config
        .base_url
        .as_deref()
        .and_then(|b| Url::parse(b).ok())
        .or_else(|| Url::parse(&url).ok());
    let raw_images = raw.field("images").map(|v| v.as_list()).unwrap_or_default();
    let images = clean_images(&raw_images, base.as_ref());
    if images.is_empty() {
        warnings.push("no_images");
    }

    let availability_text = raw.field_text("availability");
    let availability = availability_text.as_deref().and_then(classify_availability);
    if availability_text.is_some() && availability.is_none() {
        warnings.push("unclassified_availability");
    }

    let rating = clean_rating(raw.field("rating"));
    if raw.field("rating").is_some() && rating.is_none() {
        warnings.push("invalid_rating");
    }

    Ok(Cleaned {
        record: CleanRecord {
            url,
            title,
            price,
            description,
            images,
            category: clean_category(raw.field("category"), &config.category_separator),
            brand: clean_text(raw.field_text("brand").as_deref()),
            sku,
            availability,
            rating,
            reviews_count: clean_reviews_count(raw.field("reviews_count")),
            timestamp_fetched: raw.timestamp_fetched,
            timestamp_parsed: raw.timestamp_parsed,
        },
        warnings,
    })
}

/// Cleans a record set, dropping invalid records and repeated URLs
pub fn clean_records(records: &[RawRecord], config: &CleanConfig, report: &mut ValidationReport) -> Vec<CleanRecord> {
    report.input += records.len();
    let mut seen_urls = HashSet::new();
    let mut catalog = Vec::with_capacity(records.len());

    for raw in records {
        match clean_record(raw, config) {
            Ok(cleaned) => {
                if !cleaned.record.url.is_empty() && !seen_urls.insert(cleaned.record.url.clone()) {
                    tracing::debug!("Dropping repeated URL {}", cleaned.record.url);
                    *report.dropped.entry("duplicate_url".to_string()).or_insert(0) += 1;
                    continue;
                }
                for warning in &cleaned.warnings {
                    report.warn(warning);
                }
                catalog.push(cleaned.record);
            }
            Err(rejection) => {
                tracing::debug!("Dropping {}: {}", raw.url, rejection.reason());
                *report.dropped.entry(rejection.reason().to_string()).or_insert(0) += 1;
            }
        }
    }

    report.summarize(&catalog);
    catalog
}

/// Runs the clean stage over `unique.ndjson`
pub fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("clean");
    let input = ctx.paths.unique();
    artifact::require(&input, "dedupe")?;
    let records: Vec<RawRecord> = read_ndjson(&input)?;
    stats.input = records.len() as u64;
    tracing::info!("Cleaning {} records for {}", records.len(), ctx.domain);

    let mut report = ValidationReport::new(&ctx.domain);
    let catalog = clean_records(&records, &ctx.config.clean, &mut report);

    let rows: Vec<CatalogCsvRow> = catalog.iter().map(CatalogCsvRow::from).collect();
    write_csv_atomic(&ctx.paths.catalog_csv(), &rows)?;
    write_ndjson_atomic(&ctx.paths.catalog_ndjson(), &catalog)?;
    write_json_atomic(&ctx.paths.validation_report(), &report)?;

    stats.output = catalog.len() as u64;
    stats.dropped = report.dropped.clone();
    stats.detail("warnings", serde_json::to_value(&report.warnings)?);
    stats.detail("field_coverage", serde_json::to_value(&report.field_coverage)?);
    Ok(stats.finish())
}
