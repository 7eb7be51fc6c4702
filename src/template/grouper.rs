use crate::config::TemplateConfig;
use crate::records::PageType;
use crate::template::rules::{generalize_url, guess_page_type};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A generalized URL path skeleton and its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTemplate {
    pub pattern: String,
    pub count: usize,
    pub examples: Vec<String>,
    #[serde(rename = "type")]
    pub page_type: PageType,
    pub priority: i64,
}

/// Contents of `templates.json`, ranked by priority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub schema_version: u32,
    pub domain: String,
    pub templates: Vec<UrlTemplate>,
}

impl TemplateSummary {
    pub fn find(&self, pattern: &str) -> Option<&UrlTemplate> {
        self.templates.iter().find(|t| t.pattern == pattern)
    }

    /// Highest-ranked template of the given type
    pub fn top_of_type(&self, page_type: PageType) -> Option<&UrlTemplate> {
        self.templates.iter().find(|t| t.page_type == page_type)
    }
}

/// Priority = min(count, cap) + product bonus - pagination penalty
///
/// Product detail templates get the full bonus and listings half of it;
/// paginated and search templates are penalized.
pub fn priority_score(count: usize, page_type: PageType, config: &TemplateConfig) -> i64 {
    let base = (count as i64).min(config.priority_cap);
    let adjustment = match page_type {
        PageType::ProductDetail => config.product_bonus,
        PageType::ProductListing => config.product_bonus / 2,
        PageType::PaginatedListing | PageType::SearchResults => -config.pagination_penalty,
        PageType::Unknown => 0,
    };
    base + adjustment
}

/// Groups URLs by generalized template and ranks the groups
///
/// The result is deterministic: duplicate URLs count once, examples are the
/// lexicographically smallest members, and ties in priority are broken by
/// member count and then by pattern.
pub fn group_urls<'a, I>(urls: I, config: &TemplateConfig) -> Vec<UrlTemplate>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: BTreeMap<String, BTreeSet<&'a str>> = BTreeMap::new();
    for url in urls {
        match generalize_url(url) {
            Some(pattern) => {
                groups.entry(pattern).or_default().insert(url);
            }
            None => tracing::debug!("Skipping unparseable URL {}", url),
        }
    }

    let mut templates: Vec<UrlTemplate> = groups
        .into_iter()
        .map(|(pattern, members)| {
            let page_type = guess_page_type(&pattern);
            let count = members.len();
            UrlTemplate {
                priority: priority_score(count, page_type, config),
                examples: members
                    .iter()
                    .take(config.max_examples)
                    .map(|u| u.to_string())
                    .collect(),
                pattern,
                count,
                page_type,
            }
        })
        .collect();

    templates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.count.cmp(&a.count))
            .then_with(|| a.pattern.cmp(&b.pattern))
    });
    templates
}

/// Members of `pattern` among `urls`, sorted and deduplicated
pub fn members_of<'a, I>(pattern: &str, urls: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let members: BTreeSet<&str> = urls
        .into_iter()
        .filter(|url| generalize_url(url).as_deref() == Some(pattern))
        .collect();
    members.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> Vec<&'static str> {
        vec![
            "https://shop.example/product/widget-b",
            "https://shop.example/product/widget-a",
            "https://shop.example/product/widget-a?ref=x",
            "https://shop.example/category/tools",
            "https://shop.example/category/tools/page/2",
            "https://shop.example/about",
        ]
    }

    #[test]
    fn test_groups_and_ranks() {
        let templates = group_urls(urls(), &TemplateConfig::default());
        assert_eq!(templates[0].pattern, "/product/{slug}");
        assert_eq!(templates[0].count, 3);
        assert_eq!(templates[0].page_type, PageType::ProductDetail);
        assert_eq!(templates[0].priority, 503);

        let paginated = templates
            .iter()
            .find(|t| t.pattern == "/category/tools/page/{page}")
            .unwrap();
        assert_eq!(paginated.page_type, PageType::PaginatedListing);
        assert_eq!(paginated.priority, 1 - 200);
        assert_eq!(templates.last().unwrap().pattern, paginated.pattern);
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let config = TemplateConfig::default();
        let mut reversed = urls();
        reversed.reverse();
        assert_eq!(group_urls(urls(), &config), group_urls(reversed, &config));
    }

    #[test]
    fn test_examples_are_capped_and_sorted() {
        let config = TemplateConfig {
            max_examples: 2,
            ..TemplateConfig::default()
        };
        let templates = group_urls(urls(), &config);
        assert_eq!(
            templates[0].examples,
            vec![
                "https://shop.example/product/widget-a".to_string(),
                "https://shop.example/product/widget-a?ref=x".to_string()
            ]
        );
    }

    #[test]
    fn test_priority_cap() {
        let config = TemplateConfig::default();
        assert_eq!(priority_score(5_000, PageType::Unknown, &config), 1_000);
        assert_eq!(priority_score(10, PageType::ProductListing, &config), 260);
    }

    #[test]
    fn test_members_of() {
        let members = members_of("/product/{slug}", urls());
        assert_eq!(members.len(), 3);
        assert_eq!(members[0], "https://shop.example/product/widget-a");
    }
}
