//! Field extraction from fetched pages
//!
//! Two pipelines share one contract, raw content plus URL in, a
//! [`RawRecord`] out:
//! - The DOM pipeline parses HTML, collects embedded structured data and
//!   applies the recipe's CSS selectors with structured-data fallback
//! - The JSON pipeline applies the recipe's dotted/indexed paths to
//!   API-shaped payloads
//!
//! The field set is chosen by URL template first, then by guessed page type.

mod dom;
pub mod json;
mod page_type;
mod price;
mod structured;

pub use dom::{extract_fields, select_field};
pub use page_type::guess_page;
pub use price::parse_price;
pub use structured::{find_product, open_graph, parse_structured};

use crate::artifact::{self, read_ndjson, write_ndjson_atomic};
use crate::config::Recipe;
use crate::pipeline::StageContext;
use crate::records::{FetchMeta, FieldValue, PageType, RawRecord, StageStats};
use crate::template::generalize_url;
use crate::{Result, SieveError};
use chrono::{DateTime, Utc};
use scraper::Html;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Applies a recipe to fetched content
#[derive(Debug, Clone)]
pub struct Extractor {
    recipe: Recipe,
}

impl Extractor {
    pub fn new(recipe: Recipe) -> Self {
        Self { recipe }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Extracts one page into a raw record
    ///
    /// # Arguments
    ///
    /// * `url` - The page URL, used for template and page type selection
    /// * `body` - The fetched content
    /// * `content_type` - The response content type, if known
    /// * `fetched_at` - When the content was fetched
    ///
    /// # Returns
    ///
    /// * `Ok(RawRecord)` - The record, possibly with no extracted fields
    /// * `Err(SieveError::Extraction)` - The content could not be parsed
    pub fn extract(
        &self,
        url: &str,
        body: &str,
        content_type: Option<&str>,
        fetched_at: DateTime<Utc>,
    ) -> Result<RawRecord> {
        if body.trim().is_empty() {
            return Err(SieveError::Extraction {
                url: url.to_string(),
                message: "empty body".to_string(),
            });
        }

        let (page_type, structured_data, extracted_fields) = if is_json_payload(body, content_type) {
            self.extract_json(url, body)?
        } else {
            self.extract_html(url, body)
        };

        Ok(RawRecord {
            url: url.to_string(),
            page_type,
            timestamp_fetched: fetched_at,
            timestamp_parsed: Utc::now(),
            structured_data,
            extracted_fields,
        })
    }

    fn extract_html(
        &self,
        url: &str,
        body: &str,
    ) -> (PageType, Option<Value>, BTreeMap<String, FieldValue>) {
        let document = Html::parse_document(body);
        let structured = parse_structured(&document);
        let page_type = guess_page(url, Some(&document), structured.as_ref());
        let template = generalize_url(url);
        let set = self.recipe.field_set(template.as_deref(), page_type);
        let fields = extract_fields(&document, structured.as_ref(), set);
        (page_type, structured, fields)
    }

    fn extract_json(
        &self,
        url: &str,
        body: &str,
    ) -> Result<(PageType, Option<Value>, BTreeMap<String, FieldValue>)> {
        let payload: Value = serde_json::from_str(body).map_err(|e| SieveError::Extraction {
            url: url.to_string(),
            message: format!("invalid JSON payload: {}", e),
        })?;
        let page_type = guess_page(url, None, None);
        let template = generalize_url(url);
        let set = self.recipe.field_set(template.as_deref(), page_type);
        let fields = set
            .fields
            .iter()
            .filter_map(|rule| json::extract_field(&payload, rule).map(|v| (rule.name.clone(), v)))
            .collect();
        Ok((page_type, None, fields))
    }
}

fn is_json_payload(body: &str, content_type: Option<&str>) -> bool {
    if let Some(content_type) = content_type {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("json") {
            return true;
        }
        if content_type.contains("html") {
            return false;
        }
    }
    let start = body.trim_start();
    start.starts_with('{') || start.starts_with('[')
}

/// Runs the extraction stage over `fetch_meta.ndjson`
///
/// Only the last attempt of every URL is extracted; earlier attempts,
/// failed fetches, missing bodies and unparseable content are dropped with
/// a reason.
pub fn run(ctx: &StageContext) -> Result<StageStats> {
    let mut stats = ctx.new_stats("extract");
    let meta_path = ctx.paths.fetch_meta();
    artifact::require(&meta_path, "fetch")?;
    let metas: Vec<FetchMeta> = read_ndjson(&meta_path)?;
    stats.input = metas.len() as u64;

    let extractor = Extractor::new(ctx.recipe()?);
    tracing::info!("Extracting {} fetched pages for {}", metas.len(), ctx.domain);

    let last_attempt: HashMap<&str, usize> = metas
        .iter()
        .enumerate()
        .map(|(index, meta)| (meta.url.as_str(), index))
        .collect();

    let mut records = Vec::new();
    let mut page_types: BTreeMap<String, u64> = BTreeMap::new();
    let mut field_hits: BTreeMap<String, u64> = BTreeMap::new();

    for (index, meta) in metas.iter().enumerate() {
        if last_attempt.get(meta.url.as_str()) != Some(&index) {
            stats.drop_item("superseded_attempt");
            continue;
        }
        if !meta.is_success() {
            stats.drop_item("fetch_failed");
            continue;
        }
        let Some(file_path) = meta.file_path.as_deref() else {
            stats.drop_item("missing_body");
            continue;
        };
        let body = match std::fs::read(ctx.paths.resolve(file_path)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!("Body of {} is unreadable: {}", meta.url, e);
                stats.drop_item("missing_body");
                continue;
            }
        };

        match extractor.extract(&meta.url, &body, meta.content_type.as_deref(), meta.timestamp) {
            Ok(record) => {
                *page_types.entry(record.page_type.to_string()).or_insert(0) += 1;
                for (name, value) in &record.extracted_fields {
                    if !value.is_empty() {
                        *field_hits.entry(name.clone()).or_insert(0) += 1;
                    }
                }
                if record.extracted_fields.is_empty() {
                    tracing::debug!("No fields extracted from {}", record.url);
                }
                records.push(record);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                stats.drop_item("parse_error");
            }
        }
    }

    write_ndjson_atomic(&ctx.paths.extracted(), &records)?;
    stats.output = records.len() as u64;
    stats.detail("page_types", serde_json::to_value(&page_types)?);
    stats.detail("field_hits", serde_json::to_value(&field_hits)?);
    Ok(stats.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::NdjsonAppender;
    use crate::config::Config;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn extractor() -> Extractor {
        Extractor::new(Recipe::builtin())
    }

    #[test]
    fn test_html_page_extraction() {
        let html = r#"<html><head><title>Shop</title></head><body>
            <h1>Widget A</h1><span class="price">$19.99</span>
        </body></html>"#;
        let record = extractor()
            .extract("https://shop.example/product/widget-a", html, Some("text/html"), Utc::now())
            .unwrap();

        assert_eq!(record.page_type, PageType::ProductDetail);
        assert_eq!(record.field_text("title").as_deref(), Some("Widget A"));
        assert_eq!(record.field("price"), Some(&FieldValue::Number(19.99)));
        assert!(record.structured_data.is_none());
    }

    #[test]
    fn test_json_payload_extraction() {
        let body = r#"{"product": {"title": "Api Widget", "price": {"amount": "12.50", "currency": "EUR"},
            "images": [{"src": "https://cdn.example/1.jpg"}, "https://cdn.example/2.jpg"]}}"#;
        let record = extractor()
            .extract("https://shop.example/api/products/12", body, Some("application/json"), Utc::now())
            .unwrap();

        assert_eq!(record.field_text("title").as_deref(), Some("Api Widget"));
        assert_eq!(record.field("price"), Some(&FieldValue::Number(12.5)));
        assert_eq!(record.field("images").map(|v| v.as_list().len()), Some(2));
    }

    #[test]
    fn test_invalid_json_is_an_extraction_error() {
        let result = extractor().extract(
            "https://shop.example/api/1",
            "{not json",
            Some("application/json"),
            Utc::now(),
        );
        assert!(matches!(result, Err(SieveError::Extraction { .. })));
    }

    #[test]
    fn test_empty_fields_still_produce_a_record() {
        let record = extractor()
            .extract("https://shop.example/about", "<html><body></body></html>", None, Utc::now())
            .unwrap();
        assert!(record.extracted_fields.is_empty());
    }

    #[test]
    fn test_stage_keeps_last_attempt_and_accounts_drops() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = dir.path().to_path_buf();
        let ctx = StageContext::new("shop.example", Arc::new(config));

        let body_path = "pages/ab/widget.html";
        std::fs::create_dir_all(ctx.paths.resolve("pages/ab")).unwrap();
        std::fs::write(ctx.paths.resolve(body_path), "<h1>Widget</h1>").unwrap();

        let meta = |url: &str, status: u16, file: Option<&str>| FetchMeta {
            url: url.to_string(),
            status,
            timestamp: Utc::now(),
            file_path: file.map(str::to_string),
            final_url: None,
            content_type: Some("text/html".to_string()),
            bytes: 0,
            elapsed_ms: 0,
            rendered: false,
            error: None,
        };
        let mut appender = NdjsonAppender::open(&ctx.paths.fetch_meta()).unwrap();
        appender.append(&meta("https://shop.example/product/widget", 503, None)).unwrap();
        appender.append(&meta("https://shop.example/product/widget", 200, Some(body_path))).unwrap();
        appender.append(&meta("https://shop.example/product/gone", 404, None)).unwrap();
        appender
            .append(&meta("https://shop.example/product/lost", 200, Some("pages/zz/lost.html")))
            .unwrap();
        appender.flush().unwrap();

        let stats = run(&ctx).unwrap();
        assert_eq!(stats.input, 4);
        assert_eq!(stats.output, 1);
        assert_eq!(stats.dropped["superseded_attempt"], 1);
        assert_eq!(stats.dropped["fetch_failed"], 1);
        assert_eq!(stats.dropped["missing_body"], 1);
        assert!(stats.is_accounted());

        let records: Vec<RawRecord> = read_ndjson(&ctx.paths.extracted()).unwrap();
        assert_eq!(records[0].field_text("title").as_deref(), Some("Widget"));
    }
}
