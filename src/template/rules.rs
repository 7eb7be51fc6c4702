//! Ordered rule tables for URL generalization and page-type guessing
//!
//! Both tables are plain data: the first matching entry wins, so behavior can
//! be audited and extended by editing the tables without touching control
//! flow.

use crate::records::PageType;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Position of a path segment being generalized
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub text: &'a str,
    /// The raw segment before this one
    pub previous: Option<&'a str>,
    pub is_last: bool,
}

/// One `(matcher, replacement)` pair of the generalization table
pub struct SegmentRule {
    pub name: &'static str,
    pub placeholder: &'static str,
    matches: fn(&Segment<'_>) -> bool,
}

impl SegmentRule {
    /// Returns the replacement for `segment` if this rule applies
    pub fn apply(&self, segment: &Segment<'_>) -> Option<String> {
        if !(self.matches)(segment) {
            return None;
        }
        if self.name == "slug" {
            // A trailing slug keeps its file extension
            if let Some((_, ext)) = segment.text.rsplit_once('.') {
                if is_extension(ext) {
                    return Some(format!("{}.{}", self.placeholder, ext));
                }
            }
        }
        Some(self.placeholder.to_string())
    }
}

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid regex")
});
static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}[-_]\d{2}([-_]\d{2})?$").expect("date regex"));
static PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(page|p)[-_]?\d+$").expect("page marker regex"));
static HEX_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[0-9a-f]{16,}$").expect("hash regex"));
static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.[a-z]{2,5})?$").expect("id regex"));

const PAGINATION_PREFIXES: &[&str] = &["page", "pages", "pg"];

fn is_extension(ext: &str) -> bool {
    matches!(ext, "html" | "htm" | "php" | "aspx" | "asp" | "jsp")
}

fn is_pagination(segment: &Segment<'_>) -> bool {
    if PAGE_MARKER.is_match(segment.text) {
        return true;
    }
    let follows_marker = segment
        .previous
        .map(|p| PAGINATION_PREFIXES.contains(&p.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    follows_marker && segment.text.chars().all(|c| c.is_ascii_digit())
}

fn is_uuid(segment: &Segment<'_>) -> bool {
    UUID.is_match(segment.text)
}

fn is_date(segment: &Segment<'_>) -> bool {
    DATE.is_match(segment.text)
}

fn is_numeric(segment: &Segment<'_>) -> bool {
    NUMERIC.is_match(segment.text)
}

fn is_hash(segment: &Segment<'_>) -> bool {
    HEX_HASH.is_match(segment.text)
}

fn is_slug(segment: &Segment<'_>) -> bool {
    let stem = segment
        .text
        .rsplit_once('.')
        .filter(|(_, ext)| is_extension(ext))
        .map(|(stem, _)| stem)
        .unwrap_or(segment.text);
    segment.is_last
        && stem.contains('-')
        && stem.chars().any(|c| c.is_ascii_alphabetic())
        && stem
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '%')
}

/// The generalization table, applied per path segment in this order
pub static SEGMENT_RULES: &[SegmentRule] = &[
    SegmentRule {
        name: "pagination",
        placeholder: "{page}",
        matches: is_pagination,
    },
    SegmentRule {
        name: "uuid",
        placeholder: "{uuid}",
        matches: is_uuid,
    },
    SegmentRule {
        name: "date",
        placeholder: "{date}",
        matches: is_date,
    },
    SegmentRule {
        name: "id",
        placeholder: "{id}",
        matches: is_numeric,
    },
    SegmentRule {
        name: "hash",
        placeholder: "{hash}",
        matches: is_hash,
    },
    SegmentRule {
        name: "slug",
        placeholder: "{slug}",
        matches: is_slug,
    },
];

/// Generalizes a URL path into a template string
///
/// Empty segments and the trailing slash are dropped; the root path stays `/`.
pub fn generalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(path.len());
    for (i, text) in segments.iter().enumerate() {
        let segment = Segment {
            text,
            previous: i.checked_sub(1).map(|p| segments[p]),
            is_last: i + 1 == segments.len(),
        };
        out.push('/');
        match SEGMENT_RULES.iter().find_map(|rule| rule.apply(&segment)) {
            Some(placeholder) => out.push_str(&placeholder),
            None => out.push_str(text),
        }
    }
    out
}

/// Generalizes a full URL; the query string and fragment are ignored
pub fn generalize_url(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| generalize_path(u.path()))
}

/// One `(keyword-set, type)` pair of the page-type table
pub struct PageTypeRule {
    pub page_type: PageType,
    pub keywords: &'static [&'static str],
}

/// The page-type table; the first rule with a matching keyword wins
pub static PAGE_TYPE_RULES: &[PageTypeRule] = &[
    PageTypeRule {
        page_type: PageType::SearchResults,
        keywords: &["/search/", "/find/", "/results/", "/query/"],
    },
    PageTypeRule {
        page_type: PageType::PaginatedListing,
        keywords: &["{page}", "/page/"],
    },
    PageTypeRule {
        page_type: PageType::ProductDetail,
        keywords: &[
            "/product/",
            "/products/{",
            "/item/",
            "/items/{",
            "/p/{",
            "/dp/",
            "/sku/",
            "/goods/",
            "/listing/{",
        ],
    },
    PageTypeRule {
        page_type: PageType::ProductListing,
        keywords: &[
            "/category/",
            "/categories/",
            "/collection/",
            "/collections/",
            "/shop/",
            "/catalog/",
            "/products/",
            "/department/",
            "/c/",
        ],
    },
];

/// Guesses the page type of a template or URL path
pub fn guess_page_type(template: &str) -> PageType {
    let haystack = format!("{}/", template.to_ascii_lowercase().trim_end_matches('/'));
    PAGE_TYPE_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| haystack.contains(k)))
        .map(|rule| rule.page_type)
        .unwrap_or(PageType::Unknown)
}
