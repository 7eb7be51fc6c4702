use crate::artifact::ArtifactPaths;
use crate::config::{Config, DedupeStrategy, Recipe};
use crate::fetcher::{Fetch, HttpFetcher, RenderFetcher, RetryPolicy};
use crate::records::StageStats;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-invocation overrides coming from the command line
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    /// Template pattern for the prober and batch fetcher
    pub pattern: Option<String>,
    pub batch_size: Option<usize>,
    /// Cap on URLs fetched by the batch fetcher
    pub max_urls: Option<usize>,
    /// Discard an existing crawl checkpoint instead of resuming
    pub fresh: bool,
    pub strategy: Option<DedupeStrategy>,
    /// Apply refresh mappings to the store regardless of config
    pub apply_refresh: bool,
}

/// Everything a stage needs, passed explicitly
///
/// Stages never read global state; the domain, configuration, artifact
/// layout and fetch capability all come from here.
#[derive(Clone)]
pub struct StageContext {
    pub domain: String,
    pub config: Arc<Config>,
    pub paths: ArtifactPaths,
    pub options: StageOptions,
    /// Hash of the configuration file, recorded with every load
    pub config_hash: String,
    stop: Arc<AtomicBool>,
    fetcher: Option<Arc<dyn Fetch>>,
}

impl StageContext {
    pub fn new(domain: &str, config: Arc<Config>) -> Self {
        let domain = domain.trim().to_ascii_lowercase();
        let paths = ArtifactPaths::new(&config.paths.data_dir, &domain);
        Self {
            domain,
            config,
            paths,
            options: StageOptions::default(),
            config_hash: String::new(),
            stop: Arc::new(AtomicBool::new(false)),
            fetcher: None,
        }
    }

    pub fn with_options(mut self, options: StageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_config_hash(mut self, hash: &str) -> Self {
        self.config_hash = hash.to_string();
        self
    }

    /// Replaces both the raw and the render fetch paths
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// True once an interrupt was requested
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// The raw HTTP fetch path
    pub fn http_fetcher(&self) -> Result<Arc<dyn Fetch>> {
        if let Some(fetcher) = &self.fetcher {
            return Ok(Arc::clone(fetcher));
        }
        let timeout = Duration::from_secs(self.config.crawler.request_timeout_secs);
        let fetcher = HttpFetcher::new(&self.config.user_agent, timeout)?;
        Ok(Arc::new(fetcher))
    }

    /// The fetch path for pages, honoring a recipe's render flag
    ///
    /// Falls back to raw HTTP with a warning when rendering is requested but
    /// no render command is configured.
    pub fn page_fetcher(&self, render: bool) -> Result<Arc<dyn Fetch>> {
        if !render || self.fetcher.is_some() {
            return self.http_fetcher();
        }
        let timeout = Duration::from_secs(self.config.fetch.render_timeout_secs);
        match self
            .config
            .fetch
            .render_command
            .as_deref()
            .and_then(|command| RenderFetcher::new(command, timeout))
        {
            Some(fetcher) => Ok(Arc::new(fetcher)),
            None => {
                tracing::warn!("Recipe requires rendering but fetch.render-command is not set; using raw HTTP");
                self.http_fetcher()
            }
        }
    }

    /// Retry budget for page fetches
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.config.crawler.max_retries,
            Duration::from_millis(self.config.crawler.retry_delay_ms),
        )
    }

    /// The extraction recipe for this domain
    pub fn recipe(&self) -> Result<Recipe> {
        let path = self
            .config
            .paths
            .recipe
            .clone()
            .unwrap_or_else(|| self.paths.recipe());
        Ok(Recipe::load_or_builtin(&path)?)
    }

    pub fn new_stats(&self, stage: &str) -> StageStats {
        StageStats::new(stage, &self.domain)
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("domain", &self.domain)
            .field("paths", &self.paths)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
