use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Catalog-Sieve
///
/// Every section is optional in the TOML file; missing sections take the
/// defaults below. The configuration value is passed explicitly into every
/// stage, nothing is read from ambient global state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub paths: PathsConfig,
    pub site: SiteConfig,
    pub user_agent: UserAgentConfig,
    pub crawler: CrawlerConfig,
    pub adaptive: AdaptiveConfig,
    pub templates: TemplateConfig,
    pub probe: ProbeConfig,
    pub fetch: FetchConfig,
    pub dedupe: DedupeConfig,
    pub clean: CleanConfig,
    pub loader: LoaderConfig,
    pub refresh: RefreshConfig,
    pub gates: Vec<GateConfig>,
}

/// Filesystem layout configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathsConfig {
    /// Root directory; artifacts live under `<data-dir>/<domain>/`
    pub data_dir: PathBuf,

    /// Recipe file override (defaults to `<data-dir>/<domain>/recipe.toml`)
    pub recipe: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            recipe: None,
        }
    }
}

/// Target site scoping
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Additional host patterns in scope (e.g. "*.example.com")
    pub subdomains: Vec<String>,

    /// Explicit start URLs; defaults to `https://<domain>/`
    pub start_urls: Vec<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "CatalogSieve".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/catalog-sieve".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the user agent string: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// How the crawler acquires its initial URL set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Breadth-first link following from the start URLs
    #[default]
    Links,
    /// Sitemap walk (robots.txt `Sitemap:` lines and `/sitemap.xml`)
    Sitemap,
}

/// Frontier crawler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    pub mode: CrawlMode,

    /// Page cap; the crawl completes once this many pages were visited
    pub max_pages: u64,

    /// Checkpoint is persisted every this many pages
    pub checkpoint_interval: u64,

    pub request_timeout_secs: u64,

    /// Retry budget for transient network failures and 5xx responses
    pub max_retries: u32,

    pub retry_delay_ms: u64,

    /// Upper bound on an honored `Retry-After`
    pub max_retry_after_secs: u64,

    /// How many times a 429 is waited out before the URL is recorded as failed
    pub rate_limit_retries: u32,

    pub respect_robots: bool,

    /// Maximum nesting of sitemap indexes
    pub max_sitemap_depth: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            mode: CrawlMode::Links,
            max_pages: 10_000,
            checkpoint_interval: 50,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 2_000,
            max_retry_after_secs: 120,
            rate_limit_retries: 3,
            respect_robots: true,
            max_sitemap_depth: 3,
        }
    }
}

/// A distinct client identity the adaptive strategy can rotate through
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentityProfile {
    pub name: String,
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: Option<String>,
}

/// Adaptive / success-oriented fetch strategy
///
/// The streak thresholds and factors are tuning knobs, not contracts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Consecutive 2xx responses before the delay shrinks
    pub speed_up_streak: u32,

    /// Consecutive failures before the delay grows
    pub slow_down_streak: u32,

    pub speed_up_factor: f64,
    pub slow_down_factor: f64,

    /// Search-engine style referers tried after "no referer" and "site referer"
    pub referer_variants: Vec<String>,

    pub identity_profiles: Vec<IdentityProfile>,

    /// Skip URLs whose generalized pattern has only ever been blocked
    pub skip_blocked_patterns: bool,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1_000,
            min_delay_ms: 250,
            max_delay_ms: 30_000,
            speed_up_streak: 10,
            slow_down_streak: 2,
            speed_up_factor: 0.8,
            slow_down_factor: 2.0,
            referer_variants: vec!["https://www.google.com/".to_string()],
            identity_profiles: Vec::new(),
            skip_blocked_patterns: true,
        }
    }
}

/// Template ranking parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TemplateConfig {
    pub priority_cap: i64,
    pub product_bonus: i64,
    pub pagination_penalty: i64,
    pub max_examples: usize,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            priority_cap: 1_000,
            product_bonus: 500,
            pagination_penalty: 200,
            max_examples: 5,
        }
    }
}

/// Sample prober configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProbeConfig {
    pub sample_size: usize,
    pub coverage_threshold: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sample_size: 30,
            coverage_threshold: 0.9,
        }
    }
}

/// Batch fetcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub batch_pause_ms: u64,

    /// External render-capable fetcher, invoked as `<command> <url>`
    pub render_command: Option<String>,

    pub render_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrency: 8,
            batch_pause_ms: 1_000,
            render_command: None,
            render_timeout_secs: 60,
        }
    }
}

/// Identity strategy used by the deduplicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupeStrategy {
    #[default]
    Auto,
    Url,
    Content,
    Id,
}

impl std::str::FromStr for DedupeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "url" => Ok(Self::Url),
            "content" => Ok(Self::Content),
            "id" => Ok(Self::Id),
            other => Err(format!("unknown dedupe strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DedupeConfig {
    pub strategy: DedupeStrategy,
}

/// Cleaner / validator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CleanConfig {
    /// Base URL for absolutizing relative image URLs (defaults to the record URL)
    pub base_url: Option<String>,

    /// Drop the whole record when its price is missing or out of range
    pub price_required: bool,

    pub category_separator: String,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            price_required: false,
            category_separator: " > ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderBackend {
    #[default]
    File,
    Sqlite,
}

/// Loader configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoaderConfig {
    pub backend: LoaderBackend,

    /// SQLite database path (defaults to `<data-dir>/<domain>/catalog.db`)
    pub database_path: Option<PathBuf>,
}

/// Refresher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RefreshConfig {
    /// Loaded URLs checked per refresh run
    pub sample_size: usize,

    /// URLs sampled per known template for drift detection
    pub per_template_sample: usize,

    /// Fraction of a template's sample that must move to one new template
    pub drift_threshold: f64,

    /// Apply mappings to the persisted store
    pub apply: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            sample_size: 200,
            per_template_sample: 5,
            drift_threshold: 0.8,
            apply: false,
        }
    }
}

/// A manual decision point placed after a stage
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GateConfig {
    pub name: String,
    pub after_stage: String,
    #[serde(default)]
    pub description: Option<String>,
}
