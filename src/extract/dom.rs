//! DOM pipeline: CSS selectors with structured-data fallback

use crate::config::{FieldKind, FieldRule, FieldSet};
use crate::extract::json;
use crate::extract::price::parse_price;
use crate::extract::structured::{collapse_whitespace, find_product, microdata, open_graph};
use crate::records::FieldValue;
use scraper::{ElementRef, Html};
use serde_json::Value;
use std::collections::BTreeMap;

/// Open Graph properties usable as a last resort, per field name
const OPEN_GRAPH_FALLBACKS: &[(&str, &[&str])] = &[
    ("title", &["og:title"]),
    ("description", &["og:description"]),
    ("images", &["og:image", "og:image:url"]),
    ("price", &["product:price:amount", "og:price:amount"]),
    ("brand", &["product:brand", "og:brand"]),
    ("availability", &["product:availability", "og:availability"]),
];

/// Extracts every field of `set` from a document
///
/// For each field the selectors are tried in order; when none yields a
/// value, the field's JSON paths are tried against the JSON-LD product,
/// then against the microdata, and finally the Open Graph table is used.
pub fn extract_fields(
    document: &Html,
    structured: Option<&Value>,
    set: &FieldSet,
) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    for rule in &set.fields {
        let value = select_field(document, rule).or_else(|| {
            structured.and_then(|structured| structured_fallback(structured, rule))
        });
        if let Some(value) = value {
            fields.insert(rule.name.clone(), value);
        }
    }
    fields
}

/// First non-empty value over the rule's selectors
pub fn select_field(document: &Html, rule: &FieldRule) -> Option<FieldValue> {
    rule.selectors.iter().find_map(|selector| {
        let elements: Vec<ElementRef<'_>> = document.select(selector).collect();
        if elements.is_empty() {
            return None;
        }
        element_value(&elements, rule).filter(|v| !v.is_empty())
    })
}

fn element_value(elements: &[ElementRef<'_>], rule: &FieldRule) -> Option<FieldValue> {
    match rule.kind {
        FieldKind::Text => elements.iter().find_map(|e| text_or_content(e)).map(FieldValue::Text),
        FieldKind::Price => elements
            .iter()
            .find_map(|e| {
                let content = e.value().attr("content").and_then(parse_price);
                content.or_else(|| parse_price(&element_text(e)))
            })
            .map(FieldValue::Number),
        FieldKind::Images => {
            let mut urls: Vec<String> = Vec::new();
            for element in elements {
                for attr in ["src", "data-src", "content", "href"] {
                    if let Some(value) = element.value().attr(attr).map(str::trim) {
                        if !value.is_empty() && !urls.iter().any(|u| u == value) {
                            urls.push(value.to_string());
                        }
                        break;
                    }
                }
            }
            (!urls.is_empty()).then_some(FieldValue::List(urls))
        }
        FieldKind::Attr => {
            let attr = rule.attr.as_deref()?;
            elements
                .iter()
                .filter_map(|e| e.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(|v| FieldValue::Text(v.to_string()))
        }
        FieldKind::Html => elements
            .iter()
            .map(|e| e.inner_html().trim().to_string())
            .find(|html| !html.is_empty())
            .map(FieldValue::Text),
        FieldKind::List => {
            let items: Vec<String> = elements.iter().filter_map(|e| text_or_content(e)).collect();
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Collapsed text, falling back to the `content` attribute (meta tags)
fn text_or_content(element: &ElementRef<'_>) -> Option<String> {
    let text = element_text(element);
    if !text.is_empty() {
        return Some(text);
    }
    element
        .value()
        .attr("content")
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn structured_fallback(structured: &Value, rule: &FieldRule) -> Option<FieldValue> {
    let sources = [find_product(structured), microdata(structured)];
    sources
        .into_iter()
        .flatten()
        .find_map(|source| json::extract_field(source, rule))
        .or_else(|| open_graph_fallback(structured, rule))
}

fn open_graph_fallback(structured: &Value, rule: &FieldRule) -> Option<FieldValue> {
    let (_, properties) = OPEN_GRAPH_FALLBACKS
        .iter()
        .find(|(field, _)| *field == rule.name)?;
    properties
        .iter()
        .find_map(|p| open_graph(structured, p))
        .and_then(|value| json::convert(&Value::String(value.to_string()), rule.kind))
}
