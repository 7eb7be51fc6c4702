//! Numeric price extraction from currency text

use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d.,'\s\u{a0}]*").expect("price regex"));

/// Parses the first number in a price string
///
/// Handles thousands separators in both the `1,234.50` and the `1.234,50`
/// conventions. A lone comma followed by one or two digits is a decimal
/// comma; a lone dot is always a decimal point.
///
/// # Examples
///
/// ```
/// use catalog_sieve::extract::parse_price;
///
/// assert_eq!(parse_price("$1,234.50"), Some(1234.50));
/// assert_eq!(parse_price("12,50 €"), Some(12.50));
/// assert_eq!(parse_price("Call for price"), None);
/// ```
pub fn parse_price(text: &str) -> Option<f64> {
    let token = NUMBER.find(text)?.as_str();
    let token = token.trim_end_matches(|c: char| !c.is_ascii_digit());
    let compact: String = token
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();

    let last_dot = compact.rfind('.');
    let last_comma = compact.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if dot > comma => compact.replace(',', ""),
        (Some(_), Some(_)) => compact.replace('.', "").replace(',', "."),
        (None, Some(comma)) => {
            let decimals = compact.len() - comma - 1;
            if compact.matches(',').count() == 1 && decimals <= 2 {
                compact.replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
        (Some(_), None) if compact.matches('.').count() > 1 => compact.replace('.', ""),
        _ => compact,
    };

    normalized.parse::<f64>().ok().filter(|p| p.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_format() {
        assert_eq!(parse_price("$1,234.50"), Some(1234.50));
        assert_eq!(parse_price("$2,000,000"), Some(2_000_000.0));
        assert_eq!(parse_price("USD 19.99"), Some(19.99));
        assert_eq!(parse_price("$0"), Some(0.0));
    }

    #[test]
    fn test_european_format() {
        assert_eq!(parse_price("€1.234,56"), Some(1234.56));
        assert_eq!(parse_price("12,50 €"), Some(12.50));
        assert_eq!(parse_price("1 299,00 kr"), Some(1299.0));
        assert_eq!(parse_price("1.234.567"), Some(1_234_567.0));
    }

    #[test]
    fn test_first_number_wins() {
        assert_eq!(parse_price("$10 - $20"), Some(10.0));
        assert_eq!(parse_price("Now 15.00, was 20.00"), Some(15.0));
    }

    #[test]
    fn test_no_number() {
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("Sold out"), None);
    }
}
