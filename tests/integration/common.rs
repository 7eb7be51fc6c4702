use catalog_sieve::config::Config;
use catalog_sieve::pipeline::StageContext;
use std::path::Path;
use std::sync::Arc;
use wiremock::MockServer;

/// Host of a mock server, used as the crawl domain
pub fn host_of(server: &MockServer) -> String {
    url::Url::parse(&server.uri())
        .expect("Failed to parse base URL")
        .host_str()
        .expect("Failed to extract host")
        .to_string()
}

/// A configuration without pauses, robots.txt or long retry budgets
pub fn fast_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = data_dir.to_path_buf();
    config.crawler.respect_robots = false;
    config.crawler.max_retries = 1;
    config.crawler.retry_delay_ms = 0;
    config.crawler.checkpoint_interval = 1;
    config.adaptive.initial_delay_ms = 0;
    config.adaptive.min_delay_ms = 0;
    config.adaptive.max_delay_ms = 0;
    config.fetch.batch_pause_ms = 0;
    config
}

pub fn context(server: &MockServer, config: Config) -> StageContext {
    StageContext::new(&host_of(server), Arc::new(config))
}
