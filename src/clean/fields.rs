//! Per-field cleaners
//!
//! Each cleaner is a pure function of its input. A `None` result means the
//! field is dropped; the caller records the matching soft warning.

use crate::extract::parse_price;
use crate::records::FieldValue;
use crate::url::strip_tracking_params;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use url::Url;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 500;
pub const PRICE_MIN: f64 = 0.01;
pub const PRICE_MAX: f64 = 1_000_000.0;
pub const DESCRIPTION_MIN_CHARS: usize = 10;
pub const DESCRIPTION_MAX_CHARS: usize = 5_000;

const TRAILING_SEPARATORS: &[char] = &['|', '-', '–', '—', ':', '·', '•', '/', ',', ';', '>'];

/// Separators used inside a single-string category path
const CATEGORY_SEPARATORS: &[&str] = &[">", "»", "›", "/", "|"];

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline regex"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").expect("space regex"));
static RATING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("rating regex"));

/// Decodes entities and strips markup, keeping line structure
fn plain_text(text: &str) -> String {
    if !text.contains('<') && !text.contains('&') {
        return text.to_string();
    }
    Html::parse_fragment(text).root_element().text().collect()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Outcome of title cleaning
#[derive(Debug, Clone, PartialEq)]
pub enum TitleCheck {
    Valid(String),
    Missing,
    OutOfBounds(usize),
}

/// Collapses whitespace, strips trailing separators and checks the length
pub fn clean_title(raw: Option<&str>) -> TitleCheck {
    let Some(raw) = raw else {
        return TitleCheck::Missing;
    };
    let collapsed = collapse(&plain_text(raw));
    let title = collapsed
        .trim_end_matches(|c: char| TRAILING_SEPARATORS.contains(&c) || c.is_whitespace())
        .trim_start()
        .to_string();
    let chars = title.chars().count();
    if chars == 0 {
        TitleCheck::Missing
    } else if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&chars) {
        TitleCheck::OutOfBounds(chars)
    } else {
        TitleCheck::Valid(title)
    }
}

/// Outcome of price cleaning
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceCheck {
    Valid(f64),
    Missing,
    Unparseable,
    OutOfRange(f64),
}

/// Parses a price from a number or currency text and checks its range
pub fn clean_price(raw: Option<&FieldValue>) -> PriceCheck {
    let value = match raw {
        None => return PriceCheck::Missing,
        Some(FieldValue::Number(n)) => Some(*n),
        Some(other) => match other.as_text() {
            Some(text) if !text.trim().is_empty() => parse_price(&text),
            _ => return PriceCheck::Missing,
        },
    };
    match value {
        None => PriceCheck::Unparseable,
        Some(price) if price.is_finite() && (PRICE_MIN..=PRICE_MAX).contains(&price) => {
            PriceCheck::Valid((price * 100.0).round() / 100.0)
        }
        Some(price) => PriceCheck::OutOfRange(price),
    }
}

/// Outcome of description cleaning
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptionCheck {
    Valid { text: String, truncated: bool },
    Missing,
    TooShort,
}

/// Strips markup and entities, squeezes blank lines and truncates
pub fn clean_description(raw: Option<&str>) -> DescriptionCheck {
    let Some(raw) = raw else {
        return DescriptionCheck::Missing;
    };
    let text = plain_text(raw).replace("\r\n", "\n");
    let lines: Vec<String> = text
        .lines()
        .map(|line| INLINE_SPACE.replace_all(line.trim(), " ").into_owned())
        .collect();
    let joined = lines.join("\n");
    let squeezed = EXCESS_NEWLINES.replace_all(joined.trim(), "\n\n").into_owned();

    let chars = squeezed.chars().count();
    if chars == 0 {
        return DescriptionCheck::Missing;
    }
    if chars < DESCRIPTION_MIN_CHARS {
        return DescriptionCheck::TooShort;
    }
    if chars > DESCRIPTION_MAX_CHARS {
        let text: String = squeezed.chars().take(DESCRIPTION_MAX_CHARS).collect();
        return DescriptionCheck::Valid {
            text: text.trim_end().to_string(),
            truncated: true,
        };
    }
    DescriptionCheck::Valid {
        text: squeezed,
        truncated: false,
    }
}

/// Absolutizes, filters and deduplicates image URLs
///
/// Data URIs and non-HTTP schemes are dropped; tracking parameters and
/// fragments are stripped. The first occurrence of each URL is kept.
pub fn clean_images(raw: &[String], base: Option<&Url>) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    for candidate in raw {
        let candidate = candidate.trim();
        if candidate.is_empty() || candidate.to_ascii_lowercase().starts_with("data:") {
            continue;
        }
        let parsed = match base {
            Some(base) => base.join(candidate),
            None => Url::parse(candidate),
        };
        let Ok(mut url) = parsed else {
            continue;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            continue;
        }
        url.set_fragment(None);
        strip_tracking_params(&mut url);
        let url = url.to_string();
        if !images.contains(&url) {
            images.push(url);
        }
    }
    images
}

/// Joins a category hierarchy with one separator
///
/// A single string is split on common path separators first. Repeated
/// segments are removed case-insensitively.
pub fn clean_category(raw: Option<&FieldValue>, separator: &str) -> Option<String> {
    let parts: Vec<String> = match raw? {
        FieldValue::List(items) => items.clone(),
        other => {
            let text = other.as_text()?;
            let mut parts = vec![text];
            for sep in CATEGORY_SEPARATORS {
                parts = parts
                    .iter()
                    .flat_map(|p| p.split(sep).map(str::to_string).collect::<Vec<_>>())
                    .collect();
            }
            parts
        }
    };

    let mut seen: Vec<String> = Vec::new();
    let mut segments: Vec<String> = Vec::new();
    for part in parts {
        let segment = collapse(&plain_text(&part));
        if segment.is_empty() {
            continue;
        }
        let key = segment.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            segments.push(segment);
        }
    }
    (!segments.is_empty()).then(|| segments.join(separator))
}

/// Collapsed single-line text, or `None` when empty
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let text = collapse(&plain_text(raw?));
    (!text.is_empty()).then_some(text)
}

/// Rating on a 0-5 scale
pub fn clean_rating(raw: Option<&FieldValue>) -> Option<f64> {
    let value = match raw? {
        FieldValue::Number(n) => *n,
        other => {
            let text = other.as_text()?;
            let found = RATING.find(&text)?;
            found.as_str().replace(',', ".").parse().ok()?
        }
    };
    (value.is_finite() && (0.0..=5.0).contains(&value)).then_some(value)
}

/// Review count from digits, ignoring grouping separators
pub fn clean_reviews_count(raw: Option<&FieldValue>) -> Option<u32> {
    match raw? {
        FieldValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => Some(*n as u32),
        FieldValue::Number(_) => None,
        other => {
            let text = other.as_text()?;
            let digits: String = text
                .split_whitespace()
                .find(|word| word.chars().next().map_or(false, |c| c.is_ascii_digit()))?
                .chars()
                .filter(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
    }
}
