use crate::UrlError;
use url::Url;

/// Tracking query parameters removed during normalization
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "yclid", "igshid", "mc_eid", "mc_cid", "srsltid", "_ga",
    "spm", "ref", "ref_", "source",
];

/// Normalizes a URL into the key used for visited sets and identity
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host
/// 3. Normalize path:
///    - Remove dot segments (. and ..) and empty segments
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 4. Remove fragment (everything after #)
/// 5. Remove tracking query parameters
/// 6. Sort remaining query parameters alphabetically
/// 7. Remove empty query string (trailing ?)
///
/// The scheme and any `www.` prefix are kept: the normalized URL is also
/// the URL that gets fetched.
///
/// # Examples
///
/// ```
/// use catalog_sieve::url::normalize_url;
///
/// let url = normalize_url("https://Shop.EXAMPLE.com/item/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://shop.example.com/item");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) => {
            let lowered = host.to_lowercase();
            if lowered != host {
                url.set_host(Some(&lowered))
                    .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
            }
        }
        None => return Err(UrlError::MissingDomain),
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    strip_tracking_params(&mut url);

    Ok(url)
}

/// Normalizes a URL and returns it as a string, or the trimmed input when it
/// cannot be parsed
pub fn normalize_url_lossy(url_str: &str) -> String {
    normalize_url(url_str)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url_str.trim().to_string())
}

/// Removes tracking parameters and sorts the remaining query pairs
pub fn strip_tracking_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.sort();

    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str()) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(input: &str) -> String {
        normalize_url(input).unwrap().to_string()
    }

    #[test]
    fn test_scheme_and_www_survive() {
        assert_eq!(norm("http://shop.test/item/42"), "http://shop.test/item/42");
        assert_eq!(norm("https://www.shop.test/"), "https://www.shop.test/");
    }

    #[test]
    fn test_path_cleanup() {
        assert_eq!(norm("https://shop.test/item/42/"), "https://shop.test/item/42");
        assert_eq!(norm("https://shop.test"), "https://shop.test/");
        assert_eq!(norm("https://shop.test/c/shoes/../bags/./tote"), "https://shop.test/c/bags/tote");
        assert_eq!(norm("https://shop.test//c///bags//"), "https://shop.test/c/bags");
    }

    #[test]
    fn test_host_lowercased_path_untouched() {
        assert_eq!(norm("https://Shop.TEST/Item/ABC-1"), "https://shop.test/Item/ABC-1");
    }

    #[test]
    fn test_fragment_dropped() {
        assert_eq!(norm("https://shop.test/item/42#reviews"), "https://shop.test/item/42");
    }

    #[test]
    fn test_tracking_params_dropped_rest_sorted() {
        assert_eq!(
            norm("https://shop.test/c/bags?size=m&gclid=abc&color=red&utm_campaign=fall&ref=home"),
            "https://shop.test/c/bags?color=red&size=m"
        );
        assert_eq!(norm("https://shop.test/item/42?UTM_Source=mail"), "https://shop.test/item/42");
        assert_eq!(norm("https://shop.test/find?q=red+shoes&srsltid=z"), "https://shop.test/find?q=red+shoes");
    }

    #[test]
    fn test_rejects_non_http() {
        assert!(matches!(
            normalize_url("mailto:sales@shop.test"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(normalize_url("/relative/only").is_err());
    }

    #[test]
    fn test_lossy_falls_back_to_trimmed_input() {
        assert_eq!(normalize_url_lossy(" item 42 "), "item 42");
        assert_eq!(normalize_url_lossy("https://shop.test/a/?ref=x"), "https://shop.test/a");
    }

    #[test]
    fn test_idempotent() {
        let once = norm("http://Shop.test/c/./bags/?z=1&fbclid=t&a=2#top");
        assert_eq!(norm(&once), once);
    }
}
