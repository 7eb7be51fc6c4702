use crate::records::Availability;
use once_cell::sync::Lazy;
use regex::Regex;

/// schema.org `ItemAvailability` members, lowercased
const SCHEMA_ORG_VALUES: &[(&str, Availability)] = &[
    ("instock", Availability::InStock),
    ("onlineonly", Availability::InStock),
    ("instoreonly", Availability::InStock),
    ("limitedavailability", Availability::LimitedStock),
    ("outofstock", Availability::OutOfStock),
    ("soldout", Availability::OutOfStock),
    ("discontinued", Availability::OutOfStock),
    ("preorder", Availability::Preorder),
    ("presale", Availability::Preorder),
    ("backorder", Availability::Preorder),
];

/// Keyword sets in match order; the first set with a hit wins
///
/// Negative phrases come first because most of them contain an in-stock
/// phrase ("not in stock", "no longer available").
const AVAILABILITY_RULES: &[(Availability, &[&str])] = &[
    (
        Availability::OutOfStock,
        &[
            "out of stock",
            "out-of-stock",
            "outofstock",
            "not in stock",
            "sold out",
            "soldout",
            "unavailable",
            "not available",
            "not currently available",
            "no longer available",
            "discontinued",
            "no stock",
        ],
    ),
    (
        Availability::Preorder,
        &["pre-order", "preorder", "pre order", "backorder", "coming soon", "presale"],
    ),
    (
        Availability::LimitedStock,
        &["limited", "low stock", "few left", "almost gone", "last items"],
    ),
    (
        Availability::InStock,
        &["in stock", "in-stock", "instock", "available", "add to cart", "ships today"],
    ),
];

/// "Only 3 left", "only a few remaining"
static ONLY_FEW_LEFT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bonly\s+(\d+|a few)\s+(left|remaining|in stock)\b").expect("only-left regex")
});

/// Classifies free-text availability into the closed enum
///
/// schema.org values (bare or as a URL) map exactly; anything else goes
/// through the keyword table. Unmatched or empty text yields `None` and the
/// field is omitted. Boolean flags from JSON payloads map to in/out of stock.
pub fn classify_availability(text: &str) -> Option<Availability> {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    match lowered.as_str() {
        "true" | "yes" => return Some(Availability::InStock),
        "false" | "no" => return Some(Availability::OutOfStock),
        _ => {}
    }

    let token = lowered.rsplit('/').next().unwrap_or(&lowered);
    if let Some((_, availability)) = SCHEMA_ORG_VALUES.iter().find(|(value, _)| *value == token) {
        return Some(*availability);
    }

    let negative = &AVAILABILITY_RULES[0];
    if negative.1.iter().any(|k| lowered.contains(k)) {
        return Some(negative.0);
    }
    if ONLY_FEW_LEFT.is_match(&lowered) {
        return Some(Availability::LimitedStock);
    }
    AVAILABILITY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(availability, _)| *availability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_phrases() {
        assert_eq!(classify_availability("In Stock"), Some(Availability::InStock));
        assert_eq!(classify_availability("Sold Out"), Some(Availability::OutOfStock));
        assert_eq!(classify_availability("Currently unavailable"), Some(Availability::OutOfStock));
        assert_eq!(classify_availability("Only 2 left!"), Some(Availability::LimitedStock));
        assert_eq!(classify_availability("only a few remaining"), Some(Availability::LimitedStock));
        assert_eq!(classify_availability("Pre-order now"), Some(Availability::Preorder));
    }

    #[test]
    fn test_negated_in_stock_phrases() {
        assert_eq!(classify_availability("Not in stock"), Some(Availability::OutOfStock));
        assert_eq!(classify_availability("Currently not in stock"), Some(Availability::OutOfStock));
        assert_eq!(classify_availability("No longer available"), Some(Availability::OutOfStock));
        assert_eq!(classify_availability("Not currently available"), Some(Availability::OutOfStock));
    }

    #[test]
    fn test_only_without_count_is_not_limited() {
        assert_eq!(classify_availability("Available online only"), Some(Availability::InStock));
        assert_eq!(classify_availability("In stock, online only"), Some(Availability::InStock));
        assert_eq!(classify_availability("Only 2 left in stock"), Some(Availability::LimitedStock));
    }

    #[test]
    fn test_schema_org_values() {
        assert_eq!(
            classify_availability("https://schema.org/InStock"),
            Some(Availability::InStock)
        );
        assert_eq!(
            classify_availability("http://schema.org/OutOfStock"),
            Some(Availability::OutOfStock)
        );
        assert_eq!(
            classify_availability("LimitedAvailability"),
            Some(Availability::LimitedStock)
        );
        assert_eq!(classify_availability("PreOrder"), Some(Availability::Preorder));
        assert_eq!(
            classify_availability("https://schema.org/OnlineOnly"),
            Some(Availability::InStock)
        );
        assert_eq!(classify_availability("InStoreOnly"), Some(Availability::InStock));
        assert_eq!(
            classify_availability("https://schema.org/Discontinued"),
            Some(Availability::OutOfStock)
        );
    }

    #[test]
    fn test_unknown_text_is_omitted() {
        assert_eq!(classify_availability(""), None);
        assert_eq!(classify_availability("   "), None);
        assert_eq!(classify_availability("ask in store"), None);
        assert_eq!(classify_availability("true"), Some(Availability::InStock));
    }
}
