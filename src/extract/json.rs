//! JSON pipeline: dotted/indexed paths over API-shaped payloads

use crate::config::{FieldKind, FieldRule};
use crate::extract::price::parse_price;
use crate::records::FieldValue;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A compiled `a.b[0].c` style path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// Parses a path; keys are separated by `.`, indexes written as `[n]`
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("path is empty".to_string());
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err("empty key between dots".to_string());
            }
            let (key, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            if key.contains(']') {
                return Err(format!("unexpected ']' in '{}'", part));
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let inner = rest
                    .strip_prefix('[')
                    .and_then(|r| r.split_once(']'))
                    .ok_or_else(|| format!("unclosed index in '{}'", part))?;
                let index = inner
                    .0
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("index '{}' is not a non-negative integer", inner.0))?;
                segments.push(PathSegment::Index(index));
                rest = inner.1;
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Follows the path through `value`
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                PathSegment::Key(key) => current.get(key.as_str()),
                PathSegment::Index(index) => current.get(*index),
            })
            .filter(|v| !v.is_null())
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Tries each candidate path of `rule` in order until one yields a value
pub fn extract_field(payload: &Value, rule: &FieldRule) -> Option<FieldValue> {
    rule.paths
        .iter()
        .filter_map(|path| path.resolve(payload))
        .find_map(|value| convert(value, rule.kind))
}

/// Converts a JSON value into a field value according to `kind`
pub fn convert(value: &Value, kind: FieldKind) -> Option<FieldValue> {
    let converted = match kind {
        FieldKind::Price => price_value(value).map(FieldValue::Number),
        FieldKind::Images => {
            let urls = image_urls(value);
            (!urls.is_empty()).then_some(FieldValue::List(urls))
        }
        FieldKind::List => {
            let items: Vec<String> = match value {
                Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
                other => scalar_text(other).into_iter().collect(),
            };
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        FieldKind::Text | FieldKind::Attr | FieldKind::Html => {
            let text = match value {
                Value::Array(items) => items.iter().find_map(scalar_text),
                other => scalar_text(other),
            };
            text.map(FieldValue::Text)
        }
    };
    converted.filter(|v| !v.is_empty())
}

/// Text of a scalar, or of the `name` of an object
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get("name").and_then(scalar_text),
        _ => None,
    }
}

/// Unwraps `{amount, currency}` style objects and parses price text
pub fn price_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price(s),
        Value::Object(map) => ["amount", "value", "price", "lowPrice"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(price_value),
        Value::Array(items) => items.iter().find_map(price_value),
        _ => None,
    }
}

/// Flattens strings and `{url|src|href}` objects into a URL list
pub fn image_urls(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items.iter().flat_map(image_urls).collect(),
        Value::Object(map) => ["url", "src", "href", "contentUrl"]
            .iter()
            .find_map(|key| map.get(*key))
            .map(image_urls)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
