//! In-memory site used by unit tests

use crate::fetcher::{Fetch, FetchError, FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Page {
    status: u16,
    final_url: Option<String>,
    content_type: String,
    body: String,
}

/// Serves fixed pages; unknown URLs are 404
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Page>,
    /// Bare status answers served before the page, one per request
    upfront: Mutex<HashMap<String, VecDeque<(u16, Option<Duration>)>>>,
    referer_required: HashSet<String>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Page {
                status: 200,
                final_url: None,
                content_type: "text/html; charset=utf-8".to_string(),
                body: body.to_string(),
            },
        );
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(
            url.to_string(),
            Page {
                status,
                final_url: None,
                content_type: "text/html".to_string(),
                body: String::new(),
            },
        );
        self
    }

    /// `url` answers with the content of `target` after a redirect
    pub fn redirect(mut self, url: &str, target: &str) -> Self {
        let page = self.pages.get(target).cloned().unwrap_or(Page {
            status: 200,
            final_url: None,
            content_type: "text/html".to_string(),
            body: String::new(),
        });
        self.pages.insert(
            url.to_string(),
            Page {
                final_url: Some(target.to_string()),
                ..page
            },
        );
        self
    }

    /// The next request for `url` gets a bare `status` (with an optional
    /// Retry-After) instead of the page
    pub fn answer_once(self, url: &str, status: u16, retry_after: Option<Duration>) -> Self {
        if let Ok(mut upfront) = self.upfront.lock() {
            upfront
                .entry(url.to_string())
                .or_default()
                .push_back((status, retry_after));
        }
        self
    }

    /// Requests for `url` without a Referer header get 403
    pub fn require_referer(mut self, url: &str) -> Self {
        self.referer_required.insert(url.to_string());
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for StaticFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .upfront
            .lock()
            .ok()
            .and_then(|mut upfront| upfront.get_mut(&request.url).and_then(VecDeque::pop_front));
        let bare = match queued {
            Some(answer) => Some(answer),
            None if self.referer_required.contains(&request.url) && request.referer.is_none() => {
                Some((403, None))
            }
            None => None,
        };
        if let Some((status, retry_after)) = bare {
            return Ok(FetchResponse {
                url: request.url.clone(),
                final_url: request.url.clone(),
                status,
                content_type: "text/html".to_string(),
                body: String::new(),
                last_modified: None,
                retry_after,
                elapsed: Duration::from_millis(1),
                rendered: false,
            });
        }

        let page = self.pages.get(&request.url).cloned().unwrap_or(Page {
            status: 404,
            final_url: None,
            content_type: "text/html".to_string(),
            body: String::new(),
        });
        Ok(FetchResponse {
            url: request.url.clone(),
            final_url: page.final_url.unwrap_or_else(|| request.url.clone()),
            status: page.status,
            content_type: page.content_type,
            body: page.body,
            last_modified: None,
            retry_after: None,
            elapsed: Duration::from_millis(1),
            rendered: false,
        })
    }
}
