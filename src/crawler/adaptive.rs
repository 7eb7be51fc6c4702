//! Success-oriented fetch pacing
//!
//! Layered on top of the retry budget: it only changes pacing and identity,
//! never the number of attempts or the timeout.

use crate::config::{AdaptiveConfig, CrawlerConfig, IdentityProfile};
use crate::fetcher::{fetch_with_retry, Fetch, FetchError, FetchRequest, FetchResponse, RetryPolicy};
use crate::template::generalize_url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Historical outcome of one generalized path pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternOutcome {
    pub successes: u64,
    pub blocked: u64,
}

impl PatternOutcome {
    /// Blocked at least once and never succeeded
    pub fn is_blocked(&self) -> bool {
        self.blocked > 0 && self.successes == 0
    }
}

/// Persisted part of the strategy, stored in the crawl checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSnapshot {
    pub delay_ms: u64,
    pub patterns: BTreeMap<String, PatternOutcome>,
}

/// One header/identity variation tried on a blocked URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVariant {
    pub referer: Option<String>,
    pub profile: Option<IdentityProfile>,
}

impl RequestVariant {
    /// No referer, default identity
    pub fn plain() -> Self {
        Self {
            referer: None,
            profile: None,
        }
    }

    pub fn label(&self) -> String {
        let referer = self.referer.as_deref().unwrap_or("no referer");
        match &self.profile {
            Some(profile) => format!("{} / {}", profile.name, referer),
            None => format!("default identity / {}", referer),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveStrategy {
    config: AdaptiveConfig,
    delay: Duration,
    floor: Duration,
    success_streak: u32,
    failure_streak: u32,
    patterns: BTreeMap<String, PatternOutcome>,
    site_referer: String,
}

impl AdaptiveStrategy {
    /// # Arguments
    ///
    /// * `config` - Adaptive configuration
    /// * `site_referer` - Root URL of the target site, used as a referer variant
    pub fn new(config: AdaptiveConfig, site_referer: &str) -> Self {
        let mut strategy = Self {
            delay: Duration::from_millis(config.initial_delay_ms),
            floor: Duration::ZERO,
            success_streak: 0,
            failure_streak: 0,
            patterns: BTreeMap::new(),
            site_referer: site_referer.to_string(),
            config,
        };
        strategy.delay = strategy.clamp(strategy.delay);
        strategy
    }

    /// Raises the lower delay bound, e.g. to honor a robots.txt crawl delay
    pub fn set_floor(&mut self, floor: Duration) {
        self.floor = floor;
        self.delay = self.clamp(self.delay);
    }

    pub fn restore(&mut self, snapshot: &AdaptiveSnapshot) {
        self.delay = self.clamp(Duration::from_millis(snapshot.delay_ms));
        self.patterns = snapshot.patterns.clone();
    }

    pub fn snapshot(&self) -> AdaptiveSnapshot {
        AdaptiveSnapshot {
            delay_ms: self.delay.as_millis() as u64,
            patterns: self.patterns.clone(),
        }
    }

    /// Current pause between requests
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn min_delay(&self) -> Duration {
        Duration::from_millis(self.config.min_delay_ms).max(self.floor)
    }

    fn max_delay(&self) -> Duration {
        Duration::from_millis(self.config.max_delay_ms).max(self.min_delay())
    }

    fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.min_delay(), self.max_delay())
    }

    pub fn record_success(&mut self, url: &str) {
        self.failure_streak = 0;
        if let Some(pattern) = generalize_url(url) {
            self.patterns.entry(pattern).or_default().successes += 1;
        }
        if !self.config.enabled {
            return;
        }
        self.success_streak += 1;
        if self.success_streak >= self.config.speed_up_streak {
            self.success_streak = 0;
            self.delay = self.clamp(self.delay.mul_f64(self.config.speed_up_factor));
            tracing::debug!("Speeding up, delay now {:?}", self.delay);
        }
    }

    /// A transient failure, 5xx or rate-limit response
    pub fn record_failure(&mut self) {
        self.success_streak = 0;
        if !self.config.enabled {
            return;
        }
        self.failure_streak += 1;
        if self.failure_streak >= self.config.slow_down_streak {
            self.failure_streak = 0;
            self.delay = self.clamp(self.delay.mul_f64(self.config.slow_down_factor));
            tracing::debug!("Slowing down, delay now {:?}", self.delay);
        }
    }

    /// A URL that stayed blocked after every variant
    pub fn record_blocked(&mut self, url: &str) {
        if let Some(pattern) = generalize_url(url) {
            let outcome = self.patterns.entry(pattern.clone()).or_default();
            outcome.blocked += 1;
            if outcome.is_blocked() {
                tracing::info!("Pattern {} is blocked", pattern);
            }
        }
        self.record_failure();
    }

    /// True when `url` matches a pattern known to be blocked
    pub fn is_blocked(&self, url: &str) -> bool {
        if !self.config.enabled || !self.config.skip_blocked_patterns {
            return false;
        }
        generalize_url(url)
            .and_then(|pattern| self.patterns.get(&pattern))
            .map(PatternOutcome::is_blocked)
            .unwrap_or(false)
    }

    pub fn blocked_patterns(&self) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(_, outcome)| outcome.is_blocked())
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }

    /// Ordered request variants; the first one is the plain request
    ///
    /// Referers go: none, the target site, then the configured generic ones.
    /// Each identity profile repeats that sequence after the default identity.
    pub fn variants(&self) -> Vec<RequestVariant> {
        let plain = RequestVariant::plain();
        if !self.config.enabled {
            return vec![plain];
        }

        let mut referers: Vec<Option<String>> = vec![None, Some(self.site_referer.clone())];
        referers.extend(self.config.referer_variants.iter().cloned().map(Some));

        let mut profiles: Vec<Option<IdentityProfile>> = vec![None];
        profiles.extend(self.config.identity_profiles.iter().cloned().map(Some));

        profiles
            .iter()
            .flat_map(|profile| {
                referers.iter().map(move |referer| RequestVariant {
                    referer: referer.clone(),
                    profile: profile.clone(),
                })
            })
            .collect()
    }
}

/// Limits applied while waiting out 429s and rotating variants
#[derive(Debug, Clone, PartialEq)]
pub struct RotationLimits {
    pub rate_limit_retries: u32,
    pub retry_after_cap: Duration,
    /// Pause before every request after the first; also the 429 wait when
    /// the server sends no Retry-After
    pub pace: Duration,
}

impl RotationLimits {
    pub fn from_config(crawler: &CrawlerConfig, pace: Duration) -> Self {
        Self {
            rate_limit_retries: crawler.rate_limit_retries,
            retry_after_cap: Duration::from_secs(crawler.max_retry_after_secs),
            pace,
        }
    }
}

/// Final response of [`fetch_rotating`] plus what it took to get it
#[derive(Debug, Clone)]
pub struct RotatedResponse {
    pub response: FetchResponse,
    /// 429 responses that were waited out
    pub rate_limited: u32,
    pub attempts: u32,
    /// Still 401/403/429 after the last variant
    pub blocked: bool,
}

/// Fetches `url`, waiting out 429 responses and walking `variants` while the
/// site keeps answering 401/403/429
///
/// Each attempt goes through the retry budget of `retry`, so transport
/// errors and 5xx responses never trigger a rotation.
///
/// # Arguments
///
/// * `fetcher` - Fetch capability
/// * `url` - URL to fetch
/// * `variants` - Ordered request variants, plain request first
/// * `retry` - Retry budget for each attempt
/// * `limits` - Rate-limit waits and pacing
pub async fn fetch_rotating(
    fetcher: &dyn Fetch,
    url: &str,
    variants: &[RequestVariant],
    retry: &RetryPolicy,
    limits: &RotationLimits,
) -> Result<RotatedResponse, FetchError> {
    let plain = [RequestVariant::plain()];
    let variants = if variants.is_empty() { &plain[..] } else { variants };
    let mut variant_index = 0;
    let mut rate_limited = 0;
    let mut attempts = 0;

    loop {
        let variant = &variants[variant_index];
        let request = FetchRequest::new(url)
            .with_referer(variant.referer.clone())
            .with_profile(variant.profile.as_ref());

        if attempts > 0 && !limits.pace.is_zero() {
            tokio::time::sleep(limits.pace).await;
        }
        attempts += 1;
        let response = fetch_with_retry(fetcher, &request, retry).await?;

        if response.status == 429 && rate_limited < limits.rate_limit_retries {
            rate_limited += 1;
            let wait = response
                .retry_after
                .unwrap_or(limits.pace)
                .min(limits.retry_after_cap);
            tracing::info!(
                "HTTP 429 for {}, waiting {:?} before retry {}/{}",
                url,
                wait,
                rate_limited,
                limits.rate_limit_retries
            );
            tokio::time::sleep(wait).await;
            continue;
        }

        if response.is_blocking() && variant_index + 1 < variants.len() {
            variant_index += 1;
            tracing::debug!(
                "HTTP {} for {}, retrying as {}",
                response.status,
                url,
                variants[variant_index].label()
            );
            continue;
        }

        let blocked = response.is_blocking();
        return Ok(RotatedResponse {
            response,
            rate_limited,
            attempts,
            blocked,
        });
    }
}
