/// Checks if a host matches a subdomain pattern
///
/// `"shop.example.com"` matches only itself; `"*.example.com"` matches the
/// bare domain and every subdomain below it, at any depth. Comparison is
/// ASCII case-insensitive.
///
/// # Examples
///
/// ```
/// use catalog_sieve::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "cdn.eu.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&format!(".{}", base)),
        None => host == pattern,
    }
}
