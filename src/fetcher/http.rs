//! Raw HTTP fetching with reqwest

use crate::config::UserAgentConfig;
use crate::fetcher::{Fetch, FetchError, FetchRequest, FetchResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{
    HeaderName, ACCEPT_LANGUAGE, CONTENT_TYPE, LAST_MODIFIED, REFERER, RETRY_AFTER, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Builds an HTTP client with the crawler's identification
///
/// # Arguments
///
/// * `config` - User agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// A configured reqwest Client or an error
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Parses a `Retry-After` value given in seconds or as an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// Fetches pages over plain HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, timeout)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = self.client.get(&request.url);
        if let Some(ua) = &request.user_agent {
            builder = builder.header(USER_AGENT, ua);
        }
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }
        if let Some(lang) = &request.accept_language {
            builder = builder.header(ACCEPT_LANGUAGE, lang);
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&request.url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response.headers();
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE).unwrap_or_default();
        let last_modified = header(LAST_MODIFIED);
        let retry_after = header(RETRY_AFTER).and_then(|v| parse_retry_after(&v));

        let body = response
            .text()
            .await
            .map_err(|e| classify_error(&request.url, e))?;

        Ok(FetchResponse {
            url: request.url.clone(),
            final_url,
            status,
            content_type,
            body,
            last_modified,
            retry_after,
            elapsed: started.elapsed(),
            rendered: false,
        })
    }
}

fn classify_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if e.is_connect() {
        FetchError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
