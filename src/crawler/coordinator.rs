//! Crawl loop
//!
//! A single mutator owns the frontier, the visited set and the URL metadata,
//! so every checkpoint is an internally consistent snapshot. Resuming from a
//! checkpoint continues the same FIFO order an uninterrupted run would have
//! followed.

use crate::artifact::{write_csv_atomic, ArtifactPaths};
use crate::config::{Config, CrawlMode};
use crate::crawler::adaptive::{fetch_rotating, AdaptiveStrategy, RotationLimits};
use crate::crawler::checkpoint::CheckpointState;
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::extract_links;
use crate::crawler::sitemap::walk_sitemaps;
use crate::fetcher::{Fetch, FetchError, FetchResponse, RetryPolicy};
use crate::records::{StageStats, UrlRecord};
use crate::robots::{fetch_robots, RobotsPolicy};
use crate::url::{normalize_url, site_root, SiteScope};
use crate::{Result, SieveError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Summary of one crawl invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub visited: usize,
    pub pages_crawled: u64,
    /// Frontier exhausted or page cap reached
    pub completed: bool,
    pub resumed: bool,
    pub frontier_remaining: usize,
}

pub struct Crawler {
    domain: String,
    config: Arc<Config>,
    paths: ArtifactPaths,
    fetcher: Arc<dyn Fetch>,
    scope: SiteScope,
    robots: RobotsPolicy,
    adaptive: AdaptiveStrategy,
    retry: RetryPolicy,
    frontier: Frontier,
    visited: BTreeSet<String>,
    url_metadata: BTreeMap<String, UrlRecord>,
    pages_crawled: u64,
    skipped: BTreeMap<String, u64>,
    since_checkpoint: u64,
    requests_sent: u64,
    resumed: bool,
    stop: Arc<AtomicBool>,
}

impl Crawler {
    /// Opens a crawl for `domain`, resuming from a checkpoint when one exists
    ///
    /// # Arguments
    ///
    /// * `domain` - Target domain (artifact directory key)
    /// * `config` - Shared configuration
    /// * `paths` - Artifact layout of the domain
    /// * `fetcher` - Fetch capability for pages, robots.txt and sitemaps
    /// * `fresh` - Discard an existing checkpoint and start over
    /// * `stop` - Cooperative interrupt flag
    pub async fn open(
        domain: &str,
        config: Arc<Config>,
        paths: ArtifactPaths,
        fetcher: Arc<dyn Fetch>,
        fresh: bool,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let start_urls = start_urls(domain, &config)?;
        let root = site_root(&start_urls[0]);
        let scope = SiteScope::new(domain, &config.site.subdomains);
        let retry = RetryPolicy::multiplicative(
            config.crawler.max_retries,
            Duration::from_millis(config.crawler.retry_delay_ms),
            2.0,
        );

        let checkpoint_path = paths.checkpoint();
        if fresh {
            CheckpointState::remove(&checkpoint_path)?;
        }
        let checkpoint = CheckpointState::load(&checkpoint_path, domain)?;

        let needs_robots = config.crawler.respect_robots
            || (checkpoint.is_none() && config.crawler.mode == CrawlMode::Sitemap);
        let robots = if needs_robots {
            fetch_robots(fetcher.as_ref(), &start_urls[0]).await
        } else {
            RobotsPolicy::allow_all()
        };

        let mut adaptive = AdaptiveStrategy::new(config.adaptive.clone(), root.as_str());
        if config.crawler.respect_robots {
            if let Some(delay) = robots.crawl_delay(&config.user_agent.crawler_name) {
                tracing::info!("Honoring robots.txt crawl delay of {}s", delay);
                adaptive.set_floor(Duration::from_secs_f64(delay.max(0.0)));
            }
        }

        let mut crawler = Self {
            domain: domain.to_string(),
            config: Arc::clone(&config),
            paths,
            fetcher,
            scope,
            robots,
            adaptive,
            retry,
            frontier: Frontier::new(),
            visited: BTreeSet::new(),
            url_metadata: BTreeMap::new(),
            pages_crawled: 0,
            skipped: BTreeMap::new(),
            since_checkpoint: 0,
            requests_sent: 0,
            resumed: false,
            stop,
        };

        match checkpoint {
            Some(state) => {
                tracing::info!(
                    "Resuming crawl of {}: {} visited, {} queued (saved {})",
                    domain,
                    state.visited.len(),
                    state.frontier.len(),
                    state.saved_at
                );
                crawler.restore(state);
            }
            None => crawler.seed(&start_urls).await,
        }

        Ok(crawler)
    }

    fn restore(&mut self, state: CheckpointState) {
        self.frontier = Frontier::from_queue(state.frontier);
        self.visited = state.visited;
        self.url_metadata = state.url_metadata;
        self.pages_crawled = state.pages_crawled;
        self.skipped = state.skipped;
        self.adaptive.restore(&state.adaptive);
        self.resumed = true;
    }

    async fn seed(&mut self, start_urls: &[Url]) {
        match self.config.crawler.mode {
            CrawlMode::Links => {
                for url in start_urls {
                    self.enqueue(url.as_str());
                }
            }
            CrawlMode::Sitemap => {
                let mut roots = self.robots.sitemaps();
                if roots.is_empty() {
                    roots.extend(start_urls.iter().filter_map(|u| u.join("/sitemap.xml").ok()).map(String::from));
                }
                let pages = walk_sitemaps(
                    self.fetcher.as_ref(),
                    &roots,
                    self.config.crawler.max_sitemap_depth,
                    &self.retry,
                )
                .await;
                tracing::info!("Seeding frontier with {} sitemap URLs", pages.len());
                for page in &pages {
                    self.enqueue(page);
                }
                if self.frontier.is_empty() {
                    tracing::warn!("Sitemaps yielded no URLs, falling back to start URLs");
                    for url in start_urls {
                        self.enqueue(url.as_str());
                    }
                }
            }
        }
    }

    /// Normalizes `url` and queues it when in scope and unseen
    fn enqueue(&mut self, url: &str) -> bool {
        let Ok(normalized) = normalize_url(url) else {
            return false;
        };
        if !self.scope.contains(&normalized) {
            return false;
        }
        let key = String::from(normalized);
        if self.visited.contains(&key) {
            return false;
        }
        self.frontier.push(key)
    }

    pub fn visited(&self) -> &BTreeSet<String> {
        &self.visited
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    fn at_page_cap(&self) -> bool {
        self.pages_crawled >= self.config.crawler.max_pages
    }

    /// Processes one URL from the frontier
    ///
    /// Returns `false` once the frontier is exhausted or the page cap is hit.
    pub async fn step(&mut self) -> Result<bool> {
        if self.at_page_cap() {
            return Ok(false);
        }
        let Some(url) = self.frontier.pop() else {
            return Ok(false);
        };
        if !self.visited.insert(url.clone()) {
            return Ok(true);
        }

        if self.config.crawler.respect_robots
            && !self.robots.is_allowed(&url, &self.config.user_agent.crawler_name)
        {
            tracing::debug!("Disallowed by robots.txt: {}", url);
            self.skip("robots_disallowed");
            return Ok(true);
        }
        if self.adaptive.is_blocked(&url) {
            tracing::debug!("Skipping URL of blocked pattern: {}", url);
            self.skip("blocked_pattern");
            return Ok(true);
        }

        let record = match self.fetch_page(&url).await {
            Ok(response) => {
                if response.is_success() && response.is_html() {
                    let base = Url::parse(&response.final_url).or_else(|_| Url::parse(&url))?;
                    let mut discovered = 0;
                    for link in extract_links(&response.body, &base) {
                        if self.enqueue(link.as_str()) {
                            discovered += 1;
                        }
                    }
                    tracing::debug!("{} -> {} new links", url, discovered);
                } else if response.is_not_found() {
                    tracing::debug!("Not found: {}", url);
                } else if !response.is_success() {
                    tracing::warn!("HTTP {} for {}", response.status, url);
                }
                UrlRecord {
                    url: url.clone(),
                    status_code: response.status,
                    content_type: response.content_type,
                    size: response.body.len() as u64,
                    last_modified: response.last_modified,
                }
            }
            Err(e) => {
                tracing::warn!("Giving up on {}: {}", url, e);
                UrlRecord {
                    url: url.clone(),
                    status_code: 0,
                    content_type: String::new(),
                    size: 0,
                    last_modified: None,
                }
            }
        };

        self.url_metadata.insert(url, record);
        self.pages_crawled += 1;
        self.since_checkpoint += 1;

        if self.pages_crawled % 100 == 0 {
            tracing::info!(
                "Progress: {} pages crawled, {} queued",
                self.pages_crawled,
                self.frontier.len()
            );
        }
        if self.since_checkpoint >= self.config.crawler.checkpoint_interval {
            self.checkpoint()?;
        }
        Ok(true)
    }

    fn skip(&mut self, reason: &str) {
        *self.skipped.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Fetches one page with rate-limit waits and blocking rotation
    async fn fetch_page(&mut self, url: &str) -> std::result::Result<FetchResponse, FetchError> {
        let variants = self.adaptive.variants();
        let limits = RotationLimits::from_config(&self.config.crawler, self.adaptive.delay());
        if self.requests_sent > 0 {
            tokio::time::sleep(self.adaptive.delay()).await;
        }

        let outcome =
            match fetch_rotating(self.fetcher.as_ref(), url, &variants, &self.retry, &limits).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.requests_sent += 1;
                    self.adaptive.record_failure();
                    return Err(e);
                }
            };
        self.requests_sent += u64::from(outcome.attempts);
        for _ in 0..outcome.rate_limited {
            self.adaptive.record_failure();
        }

        let response = outcome.response;
        if outcome.blocked {
            self.adaptive.record_blocked(url);
        } else if response.is_success() {
            self.adaptive.record_success(url);
        } else if response.is_server_error() {
            self.adaptive.record_failure();
        }
        Ok(response)
    }

    fn snapshot(&self) -> CheckpointState {
        let mut state = CheckpointState::new(&self.domain);
        state.visited = self.visited.clone();
        state.frontier = self.frontier.queue().clone();
        state.url_metadata = self.url_metadata.clone();
        state.pages_crawled = self.pages_crawled;
        state.skipped = self.skipped.clone();
        state.adaptive = self.adaptive.snapshot();
        state
    }

    /// Persists the current state atomically
    pub fn checkpoint(&mut self) -> Result<()> {
        self.snapshot().save(&self.paths.checkpoint())?;
        self.since_checkpoint = 0;
        Ok(())
    }

    /// Runs until completion or interrupt
    ///
    /// On completion `urls.csv` is written and the checkpoint deleted; on
    /// interrupt or error the checkpoint is saved first.
    pub async fn run(&mut self) -> Result<CrawlReport> {
        tracing::info!(
            "Crawling {} ({:?} mode, {} queued)",
            self.domain,
            self.config.crawler.mode,
            self.frontier.len()
        );

        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.checkpoint()?;
                tracing::warn!(
                    "Crawl interrupted after {} pages; checkpoint saved",
                    self.pages_crawled
                );
                return Ok(self.report(false));
            }
            match self.step().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    if let Err(save_error) = self.checkpoint() {
                        tracing::error!("Failed to save checkpoint: {}", save_error);
                    }
                    return Err(e);
                }
            }
        }

        self.complete()?;
        Ok(self.report(true))
    }

    fn report(&self, completed: bool) -> CrawlReport {
        CrawlReport {
            visited: self.visited.len(),
            pages_crawled: self.pages_crawled,
            completed,
            resumed: self.resumed,
            frontier_remaining: self.frontier.len(),
        }
    }

    fn complete(&mut self) -> Result<()> {
        let records: Vec<&UrlRecord> = self.url_metadata.values().collect();
        write_csv_atomic(&self.paths.urls(), &records)?;
        CheckpointState::remove(&self.paths.checkpoint())?;

        if self.at_page_cap() && !self.frontier.is_empty() {
            tracing::info!(
                "Page cap of {} reached with {} URLs still queued",
                self.config.crawler.max_pages,
                self.frontier.len()
            );
        }
        tracing::info!(
            "Crawl of {} complete: {} pages, {} visited",
            self.domain,
            self.pages_crawled,
            self.visited.len()
        );
        Ok(())
    }

    /// Statistics for the completed crawl
    pub fn stats(&self) -> StageStats {
        let mut stats = StageStats::new("crawl", &self.domain);
        stats.input = self.visited.len() as u64;
        stats.output = self.url_metadata.len() as u64;
        for (reason, count) in &self.skipped {
            stats.dropped.insert(reason.clone(), *count);
        }

        let mut histogram: BTreeMap<String, u64> = BTreeMap::new();
        for record in self.url_metadata.values() {
            *histogram.entry(record.status_code.to_string()).or_insert(0) += 1;
        }
        stats.detail("pages_crawled", self.pages_crawled);
        stats.detail("status_codes", serde_json::json!(histogram));
        stats.detail("blocked_patterns", serde_json::json!(self.adaptive.blocked_patterns()));
        stats.detail("resumed", self.resumed);
        stats.detail("frontier_remaining", self.frontier.len() as u64);
        stats.detail("final_delay_ms", self.adaptive.delay().as_millis() as u64);
        stats.finish()
    }
}

/// Configured start URLs, or `https://<domain>/`
fn start_urls(domain: &str, config: &Config) -> Result<Vec<Url>> {
    if config.site.start_urls.is_empty() {
        return Ok(vec![Url::parse(&format!("https://{}/", domain))?]);
    }
    config
        .site
        .start_urls
        .iter()
        .map(|u| normalize_url(u).map_err(SieveError::from))
        .collect()
}

