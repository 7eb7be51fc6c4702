//! robots.txt rules
//!
//! Allow/Disallow matching is delegated to the robotstxt crate; the
//! `Crawl-delay` and `Sitemap` directives, which it does not expose, are read
//! directly from the file.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt of one site
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Raw file content; empty allows everything
    content: String,
}

impl RobotsPolicy {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// A policy that allows every URL
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks whether `url` may be fetched by `agent`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL of the page
    /// * `agent` - Product token of the crawler (e.g. "CatalogSieve")
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    /// `Sitemap:` URLs in file order; these are not bound to any group
    pub fn sitemaps(&self) -> Vec<String> {
        directives(&self.content)
            .filter(|(key, _)| key == "sitemap")
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// Crawl delay in seconds for `agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, agent: &str) -> Option<f64> {
        let agent = agent.to_ascii_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut specific = None;
        let mut wildcard = None;

        for (key, value) in directives(&self.content) {
            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_ascii_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        specific = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard = Some(delay);
                    }
                }
                "sitemap" => {}
                _ => in_rules = true,
            }
        }

        specific.or(wildcard)
    }
}

/// Yields `(lowercase key, trimmed value)` for every directive line
fn directives(content: &str) -> impl Iterator<Item = (String, &str)> {
    content.lines().filter_map(|line| {
        let line = line.split('#').next().unwrap_or("").trim();
        let (key, value) = line.split_once(':')?;
        Some((key.trim().to_ascii_lowercase(), value.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "CatalogSieve";

    #[test]
    fn test_allow_all() {
        let robots = RobotsPolicy::allow_all();
        assert!(robots.is_allowed("https://shop.example/cart", AGENT));
        assert!(robots.sitemaps().is_empty());
    }

    #[test]
    fn test_disallow_prefix() {
        let robots = RobotsPolicy::from_content("User-agent: *\nDisallow: /cart\n");
        assert!(robots.is_allowed("https://shop.example/product/a", AGENT));
        assert!(!robots.is_allowed("https://shop.example/cart", AGENT));
        assert!(!robots.is_allowed("https://shop.example/cart/items", AGENT));
    }

    #[test]
    fn test_specific_group_overrides_wildcard() {
        let content = "User-agent: CatalogSieve\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = RobotsPolicy::from_content(content);
        assert!(!robots.is_allowed("https://shop.example/p", AGENT));
        assert!(robots.is_allowed("https://shop.example/p", "OtherBot"));
    }

    #[test]
    fn test_sitemap_lines() {
        let content = "Sitemap: https://shop.example/sitemap.xml\nUser-agent: *\nDisallow:\nsitemap: https://shop.example/products.xml # products\n";
        let robots = RobotsPolicy::from_content(content);
        assert_eq!(
            robots.sitemaps(),
            vec![
                "https://shop.example/sitemap.xml".to_string(),
                "https://shop.example/products.xml".to_string()
            ]
        );
    }

    #[test]
    fn test_crawl_delay() {
        let content = "User-agent: CatalogSieve\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10";
        let robots = RobotsPolicy::from_content(content);
        assert_eq!(robots.crawl_delay(AGENT), Some(5.0));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let content = "User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 2.5";
        let robots = RobotsPolicy::from_content(content);
        assert_eq!(robots.crawl_delay("BotB"), Some(2.5));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }
}
