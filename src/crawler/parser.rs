//! Link extraction for the link-following crawl mode

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], link[rel='canonical'][href], link[rel='next'][href]").expect("link selector"));

const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "ftp:"];

/// File extensions never worth fetching as pages
const ASSET_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".css", ".js", ".pdf", ".zip",
    ".mp4", ".mp3", ".woff", ".woff2",
];

/// Extracts followable links from an HTML document
///
/// # Link Extraction Rules
///
/// **Include:** `<a href>`, `<link rel="canonical">` and `<link rel="next">`.
///
/// **Exclude:** `download` anchors, fragment-only links, `javascript:`,
/// `mailto:`, `tel:` and `data:` hrefs, non-HTTP(S) results and static
/// assets (images, stylesheets, scripts, archives).
///
/// # Arguments
///
/// * `html` - The document to scan
/// * `base_url` - URL the document was served from (after redirects)
///
/// # Returns
///
/// Absolute URLs in document order, duplicates included
pub fn extract_links(html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    document
        .select(&LINK_SELECTOR)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect()
}

fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let path = url.path().to_ascii_lowercase();
    if ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return None;
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://shop.example/category/tools").unwrap()
    }

    fn links(html: &str) -> Vec<String> {
        extract_links(html, &base_url())
            .into_iter()
            .map(|u| u.to_string())
            .collect()
    }

    #[test]
    fn test_relative_and_absolute_links() {
        let html = r#"<a href="/product/widget-a">A</a><a href="widget-b">B</a><a href="https://other.example/x">X</a>"#;
        assert_eq!(
            links(html),
            vec![
                "https://shop.example/product/widget-a",
                "https://shop.example/category/widget-b",
                "https://other.example/x"
            ]
        );
    }

    #[test]
    fn test_skipped_hrefs() {
        let html = r##"
            <a href="javascript:void(0)">js</a>
            <a href="MAILTO:sales@shop.example">mail</a>
            <a href="tel:+123">tel</a>
            <a href="#reviews">anchor</a>
            <a href="/manual.pdf">pdf</a>
            <a href="/export" download>download</a>
            <a href="  ">blank</a>
        "##;
        assert!(links(html).is_empty());
    }

    #[test]
    fn test_canonical_and_next() {
        let html = r#"<head><link rel="canonical" href="/category/tools"><link rel="next" href="/category/tools/page/2"><link rel="stylesheet" href="/site.css"></head>"#;
        assert_eq!(
            links(html),
            vec![
                "https://shop.example/category/tools",
                "https://shop.example/category/tools/page/2"
            ]
        );
    }

    #[test]
    fn test_nofollow_is_followed() {
        assert_eq!(links(r#"<a rel="nofollow" href="/cart">cart</a>"#).len(), 1);
    }
}
