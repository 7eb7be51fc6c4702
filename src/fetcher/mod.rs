//! Fetch capability
//!
//! Every network read in the pipeline goes through the [`Fetch`] trait, so
//! the crawler, prober, batch fetcher and refresher are indifferent to
//! whether a page comes from a raw HTTP client ([`HttpFetcher`]) or an
//! external render-capable fetcher ([`RenderFetcher`]). Both return the same
//! [`FetchResponse`] shape.

mod http;
mod render;
mod retry;
#[cfg(test)]
pub(crate) mod testing;

pub use http::{build_http_client, parse_retry_after, HttpFetcher};
pub use render::RenderFetcher;
pub use retry::{fetch_with_retry, Backoff, RetryPolicy};

use crate::config::IdentityProfile;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A single outbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Overrides the client's default user agent
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub accept_language: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_profile(mut self, profile: Option<&IdentityProfile>) -> Self {
        if let Some(profile) = profile {
            self.user_agent = Some(profile.user_agent.clone());
            self.accept_language = profile.accept_language.clone();
        }
        self
    }
}

/// Response of a completed request, whatever its status
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// The requested URL
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub last_modified: Option<String>,
    /// Parsed `Retry-After` header
    pub retry_after: Option<Duration>,
    pub elapsed: Duration,
    pub rendered: bool,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.contains("text/html") || ct.contains("application/xhtml")
    }

    /// 401, 403 and 429 are treated as anti-automation responses
    pub fn is_blocking(&self) -> bool {
        matches!(self.status, 401 | 403 | 429)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.status, 404 | 410)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// Failure to obtain any response at all
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("Render failed for {url}: {message}")]
    Render { url: String, message: String },
}

impl FetchError {
    /// Transient failures are retried within the retry budget
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connect { .. } | Self::Request { .. }
        )
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::Connect { url, .. }
            | Self::Request { url, .. }
            | Self::Render { url, .. } => url,
        }
    }
}

/// An opaque page-fetching capability
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}
