//! Embedded structured data: JSON-LD, microdata and Open Graph
//!
//! Everything here is best-effort. Malformed JSON-LD blocks are skipped and
//! the rest of the page is still used.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[type='application/ld+json']").expect("json-ld selector"));
static META_PROPERTY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[property][content]").expect("meta selector"));
static PRODUCT_SCOPE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[itemscope][itemtype*='schema.org/Product']").expect("microdata selector"));
static ITEMPROP: Lazy<Selector> = Lazy::new(|| Selector::parse("[itemprop]").expect("itemprop selector"));

/// Collects structured data from a parsed document
///
/// Returns `None` when the page carries none. The result has the shape
/// `{"json_ld": [...], "microdata": {...}, "open_graph": {...}}` with empty
/// parts omitted.
pub fn parse_structured(document: &Html) -> Option<Value> {
    let mut out = Map::new();

    let json_ld: Vec<Value> = document
        .select(&JSON_LD)
        .filter_map(|script| {
            let text: String = script.text().collect();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!("Skipping malformed JSON-LD block: {}", e);
                    None
                }
            }
        })
        .collect();
    if !json_ld.is_empty() {
        out.insert("json_ld".to_string(), Value::Array(json_ld));
    }

    if let Some(microdata) = document.select(&PRODUCT_SCOPE).next().map(microdata_object) {
        if !microdata.is_empty() {
            out.insert("microdata".to_string(), Value::Object(microdata));
        }
    }

    let open_graph: Map<String, Value> = document
        .select(&META_PROPERTY)
        .filter_map(|meta| {
            let property = meta.value().attr("property")?;
            let content = meta.value().attr("content")?.trim();
            let is_og = property.starts_with("og:") || property.starts_with("product:");
            (is_og && !content.is_empty()).then(|| (property.to_string(), Value::String(content.to_string())))
        })
        .collect();
    if !open_graph.is_empty() {
        out.insert("open_graph".to_string(), Value::Object(open_graph));
    }

    (!out.is_empty()).then_some(Value::Object(out))
}

/// Flattens the `itemprop` descendants of a product scope; first value wins
fn microdata_object(scope: ElementRef<'_>) -> Map<String, Value> {
    let mut map = Map::new();
    for element in scope.select(&ITEMPROP) {
        let Some(prop) = element.value().attr("itemprop") else {
            continue;
        };
        let value = ["content", "href", "src"]
            .iter()
            .find_map(|attr| element.value().attr(attr))
            .map(str::to_string)
            .unwrap_or_else(|| collapse_whitespace(&element.text().collect::<String>()));
        if !value.is_empty() && !map.contains_key(prop) {
            map.insert(prop.to_string(), Value::String(value));
        }
    }
    map
}

/// The first JSON-LD node typed `Product`, searching arrays and `@graph`
pub fn find_product(structured: &Value) -> Option<&Value> {
    structured
        .get("json_ld")
        .and_then(Value::as_array)?
        .iter()
        .find_map(find_product_node)
}

fn find_product_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_product_node),
        Value::Object(map) => {
            if is_product_type(map.get("@type")) {
                return Some(value);
            }
            map.get("@graph").and_then(find_product_node)
        }
        _ => None,
    }
}

fn is_product_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(t)) => t == "Product" || t.ends_with("/Product"),
        Some(Value::Array(types)) => types.iter().any(|t| is_product_type(Some(t))),
        _ => false,
    }
}

/// Open Graph property value, if present
pub fn open_graph<'a>(structured: &'a Value, property: &str) -> Option<&'a str> {
    structured
        .get("open_graph")
        .and_then(|og| og.get(property))
        .and_then(Value::as_str)
}

pub fn microdata(structured: &Value) -> Option<&Value> {
    structured.get("microdata")
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
<meta property="og:title" content="Widget A | Shop">
<meta property="og:type" content="product">
<meta property="product:price:amount" content="19.99">
<meta name="description" content="not open graph">
<script type="application/ld+json">{ this is not json }</script>
<script type="application/ld+json">
{"@context": "https://schema.org", "@graph": [
  {"@type": "BreadcrumbList"},
  {"@type": ["Product", "Thing"], "name": "Widget A", "sku": "W-A", "offers": {"price": "19.99"}}
]}
</script>
</head><body>
<div itemscope itemtype="https://schema.org/Product">
  <span itemprop="name"> Widget
     A </span>
  <meta itemprop="sku" content="W-A">
  <span itemprop="name">Ignored second name</span>
</div>
</body></html>"#;

    #[test]
    fn test_parse_all_sources() {
        let document = Html::parse_document(PAGE);
        let structured = parse_structured(&document).unwrap();

        let product = find_product(&structured).unwrap();
        assert_eq!(product["sku"], "W-A");

        assert_eq!(open_graph(&structured, "og:type"), Some("product"));
        assert_eq!(open_graph(&structured, "product:price:amount"), Some("19.99"));
        assert!(structured["open_graph"].get("description").is_none());

        let microdata = microdata(&structured).unwrap();
        assert_eq!(microdata["name"], "Widget A");
        assert_eq!(microdata["sku"], "W-A");
    }

    #[test]
    fn test_plain_page_has_none() {
        let document = Html::parse_document("<html><body><h1>Hi</h1></body></html>");
        assert!(parse_structured(&document).is_none());
    }
}
