//! Sitemap walking for the sitemap crawl mode

use crate::fetcher::{fetch_with_retry, Fetch, FetchRequest, RetryPolicy};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeSet, VecDeque};
use url::Url;

/// Contents of one sitemap document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapDocument {
    /// Page URLs from a `<urlset>`
    pub pages: Vec<String>,
    /// Nested sitemap URLs from a `<sitemapindex>`
    pub sitemaps: Vec<String>,
}

/// Parses a sitemap or sitemap index
///
/// Parsing is best-effort: malformed XML yields whatever `<loc>` entries
/// were read before the error. Relative locations resolve against `base`.
pub fn parse_sitemap(xml: &str, base: &Url) -> SitemapDocument {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_loc = false;
    let mut is_index = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"sitemapindex" {
                    is_index = true;
                } else if name.as_ref() == b"loc" {
                    in_loc = true;
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Text(text)) if in_loc => {
                if let Ok(value) = text.unescape() {
                    locs.push(value.trim().to_string());
                }
            }
            Ok(Event::CData(data)) if in_loc => {
                locs.push(String::from_utf8_lossy(&data).trim().to_string());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!("Malformed sitemap XML at {}: {}", base, e);
                break;
            }
            _ => {}
        }
    }

    let resolved = locs
        .into_iter()
        .filter(|loc| !loc.is_empty())
        .filter_map(|loc| base.join(&loc).ok())
        .map(|url| url.to_string());

    if is_index {
        SitemapDocument {
            pages: Vec::new(),
            sitemaps: resolved.collect(),
        }
    } else {
        SitemapDocument {
            pages: resolved.collect(),
            sitemaps: Vec::new(),
        }
    }
}

/// Walks sitemaps breadth-first, following indexes up to `max_depth` levels
///
/// Only `.xml` documents are followed. Each sitemap is fetched once; failed
/// fetches are logged and skipped.
pub async fn walk_sitemaps(
    fetcher: &dyn Fetch,
    roots: &[String],
    max_depth: u32,
    policy: &RetryPolicy,
) -> Vec<String> {
    let mut queue: VecDeque<(String, u32)> = roots.iter().map(|r| (r.clone(), 0)).collect();
    let mut seen_sitemaps = BTreeSet::new();
    let mut seen_pages = BTreeSet::new();
    let mut pages = Vec::new();

    while let Some((sitemap_url, depth)) = queue.pop_front() {
        if !seen_sitemaps.insert(sitemap_url.clone()) {
            continue;
        }
        let Ok(base) = Url::parse(&sitemap_url) else {
            continue;
        };
        if !base.path().to_ascii_lowercase().ends_with(".xml") {
            tracing::debug!("Skipping non-XML sitemap {}", sitemap_url);
            continue;
        }

        let response = match fetch_with_retry(fetcher, &FetchRequest::new(&sitemap_url), policy).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!("Sitemap {} returned HTTP {}", sitemap_url, response.status);
                continue;
            }
            Err(e) => {
                tracing::warn!("Sitemap {} failed: {}", sitemap_url, e);
                continue;
            }
        };

        let document = parse_sitemap(&response.body, &base);
        tracing::info!(
            "Sitemap {}: {} pages, {} nested sitemaps",
            sitemap_url,
            document.pages.len(),
            document.sitemaps.len()
        );

        if depth < max_depth {
            queue.extend(document.sitemaps.into_iter().map(|s| (s, depth + 1)));
        } else if !document.sitemaps.is_empty() {
            tracing::warn!("Sitemap depth limit reached at {}", sitemap_url);
        }
        for page in document.pages {
            if seen_pages.insert(page.clone()) {
                pages.push(page);
            }
        }
    }

    pages
}
