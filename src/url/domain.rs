use crate::url::matches_wildcard;
use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_sieve::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Root URL of the site `url` belongs to, e.g. `https://shop.example/`
pub fn site_root(url: &Url) -> String {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root.to_string()
}

/// The set of hosts a crawl is allowed to visit
///
/// The target domain itself, its `www.` variant, and any configured
/// subdomain patterns (e.g. `*.example.com`).
#[derive(Debug, Clone)]
pub struct SiteScope {
    domain: String,
    patterns: Vec<String>,
}

impl SiteScope {
    pub fn new(domain: &str, subdomains: &[String]) -> Self {
        let domain = domain.trim().to_lowercase();
        let domain = domain
            .split(':')
            .next()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .to_string();
        Self {
            domain,
            patterns: subdomains.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// The bare target domain
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn contains_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        let bare = host.strip_prefix("www.").unwrap_or(&host);
        bare == self.domain || self.patterns.iter().any(|p| matches_wildcard(p, &host))
    }

    pub fn contains(&self, url: &Url) -> bool {
        extract_domain(url).is_some_and(|host| self.contains_host(&host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_root_drops_path_and_query() {
        let url = Url::parse("http://127.0.0.1:8080/product/widget-a?ref=x#top").unwrap();
        assert_eq!(site_root(&url), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_scope_includes_domain_and_www() {
        let scope = SiteScope::new("example.com", &[]);
        assert!(scope.contains_host("example.com"));
        assert!(scope.contains_host("WWW.example.com"));
        assert!(!scope.contains_host("shop.example.com"));
        assert!(!scope.contains_host("example.org"));
    }

    #[test]
    fn test_scope_with_subdomain_patterns() {
        let scope = SiteScope::new("www.example.com", &["*.example.com".to_string()]);
        assert_eq!(scope.domain(), "example.com");
        assert!(scope.contains_host("shop.example.com"));
        assert!(scope.contains_host("cdn.eu.example.com"));
        assert!(!scope.contains_host("notexample.com"));
    }

    #[test]
    fn test_scope_ignores_port_in_domain_argument() {
        let scope = SiteScope::new("127.0.0.1:8080", &[]);
        let url = Url::parse("http://127.0.0.1:8080/product/a").unwrap();
        assert!(scope.contains(&url));
    }
}
