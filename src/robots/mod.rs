//! robots.txt handling
//!
//! The policy is fetched once per crawl. A missing file, an error response or
//! a network failure all degrade to an allow-all policy.

mod parser;

pub use parser::RobotsPolicy;

use crate::fetcher::{Fetch, FetchRequest};
use url::Url;

/// Fetches and parses `/robots.txt` for the site of `base`
///
/// # Arguments
///
/// * `fetcher` - Fetch capability used for the request
/// * `base` - Any URL on the target site
///
/// # Returns
///
/// The parsed policy, or an allow-all policy when none could be read
pub async fn fetch_robots(fetcher: &dyn Fetch, base: &Url) -> RobotsPolicy {
    let robots_url = match base.join("/robots.txt") {
        Ok(url) => url,
        Err(_) => return RobotsPolicy::allow_all(),
    };

    match fetcher.fetch(&FetchRequest::new(robots_url.as_str())).await {
        Ok(response) if response.is_success() => {
            tracing::debug!("Loaded robots.txt from {}", robots_url);
            RobotsPolicy::from_content(&response.body)
        }
        Ok(response) => {
            tracing::debug!(
                "robots.txt at {} returned HTTP {}, allowing all",
                robots_url,
                response.status
            );
            RobotsPolicy::allow_all()
        }
        Err(e) => {
            tracing::warn!("Could not fetch robots.txt: {}", e);
            RobotsPolicy::allow_all()
        }
    }
}
