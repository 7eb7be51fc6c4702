use crate::config::types::{
    AdaptiveConfig, Config, CrawlerConfig, FetchConfig, GateConfig, ProbeConfig, RefreshConfig,
    SiteConfig, UserAgentConfig,
};
use crate::pipeline::STAGE_NAMES;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_crawler_config(&config.crawler)?;
    validate_adaptive_config(&config.adaptive)?;
    validate_probe_config(&config.probe)?;
    validate_fetch_config(&config.fetch)?;
    validate_refresh_config(&config.refresh)?;
    validate_gates(&config.gates)?;

    if let Some(base) = &config.clean.base_url {
        Url::parse(base)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid clean.base-url: {}", e)))?;
    }

    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    for pattern in &config.subdomains {
        validate_domain_pattern(pattern)?;
    }

    for start in &config.start_urls {
        let url = Url::parse(start).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", start, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Start URL '{}' must use HTTP or HTTPS",
                start
            )));
        }
    }

    Ok(())
}

/// The user agent is sent with every request and matched against robots.txt
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    let name = config.crawler_name.as_str();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ConfigError::Validation(format!(
            "user-agent.crawler-name must be a non-empty token of letters, digits and '-', got '{}'",
            name
        )));
    }

    Url::parse(&config.contact_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("user-agent.contact-url '{}': {}", config.contact_url, e))
    })?;

    let valid_email = config
        .contact_email
        .split_once('@')
        .is_some_and(|(local, host)| !local.is_empty() && host.contains('.') && !host.contains('@'));
    if !valid_email {
        return Err(ConfigError::Validation(format!(
            "user-agent.contact-email is not an address: '{}'",
            config.contact_email
        )));
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "crawler.max-pages must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(
            "crawler.checkpoint-interval must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "crawler.request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_adaptive_config(config: &AdaptiveConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "adaptive.min-delay-ms ({}) must not exceed adaptive.max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if !(config.speed_up_factor > 0.0 && config.speed_up_factor <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "adaptive.speed-up-factor must be in (0, 1], got {}",
            config.speed_up_factor
        )));
    }

    if config.slow_down_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "adaptive.slow-down-factor must be >= 1, got {}",
            config.slow_down_factor
        )));
    }

    if config.speed_up_streak < 1 || config.slow_down_streak < 1 {
        return Err(ConfigError::Validation(
            "adaptive streak thresholds must be >= 1".to_string(),
        ));
    }

    for referer in &config.referer_variants {
        Url::parse(referer).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid referer variant '{}': {}", referer, e))
        })?;
    }

    for profile in &config.identity_profiles {
        if profile.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "identity profile '{}' has an empty user agent",
                profile.name
            )));
        }
    }

    Ok(())
}

fn validate_probe_config(config: &ProbeConfig) -> Result<(), ConfigError> {
    if config.sample_size < 1 {
        return Err(ConfigError::Validation(
            "probe.sample-size must be >= 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.coverage_threshold) {
        return Err(ConfigError::Validation(format!(
            "probe.coverage-threshold must be between 0 and 1, got {}",
            config.coverage_threshold
        )));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "fetch.batch-size must be >= 1".to_string(),
        ));
    }

    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "fetch.max-concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    if let Some(command) = &config.render_command {
        if command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "fetch.render-command cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_refresh_config(config: &RefreshConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.drift_threshold) || config.drift_threshold == 0.0 {
        return Err(ConfigError::Validation(format!(
            "refresh.drift-threshold must be in (0, 1], got {}",
            config.drift_threshold
        )));
    }
    Ok(())
}

fn validate_gates(gates: &[GateConfig]) -> Result<(), ConfigError> {
    for gate in gates {
        if gate.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "gate name cannot be empty".to_string(),
            ));
        }
        if !STAGE_NAMES.contains(&gate.after_stage.as_str()) {
            return Err(ConfigError::Validation(format!(
                "gate '{}' follows unknown stage '{}'",
                gate.name, gate.after_stage
            )));
        }
    }
    Ok(())
}

/// Checks a `site.subdomains` entry such as `shop.example.com` or `*.example.com`
pub(crate) fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    let labels: Vec<&str> = host.split('.').collect();
    let well_formed = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        });
    if well_formed {
        Ok(())
    } else {
        Err(ConfigError::InvalidPattern(format!(
            "'{}' is not a host name or '*.' host pattern",
            pattern
        )))
    }
}
