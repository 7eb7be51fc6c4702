use crate::fetcher::{Fetch, FetchError, FetchRequest, FetchResponse};
use std::time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Multiplicative(f64),
}

/// A finite retry budget for transient failures and 5xx responses
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn multiplicative(max_retries: u32, delay: Duration, factor: f64) -> Self {
        Self {
            max_retries,
            delay,
            backoff: Backoff::Multiplicative(factor),
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Multiplicative(factor) => self.delay.mul_f64(factor.powi(attempt as i32)),
        }
    }
}

/// Fetches with the retry budget of `policy`
///
/// Transient errors and 5xx responses are retried; any other response is
/// returned immediately. When the budget runs out, the last 5xx response or
/// the last error is returned.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    request: &FetchRequest,
    policy: &RetryPolicy,
) -> Result<FetchResponse, FetchError> {
    let mut attempt = 0;
    loop {
        let result = fetcher.fetch(request).await;
        let retryable = match &result {
            Ok(response) => response.is_server_error(),
            Err(e) => e.is_transient(),
        };

        if !retryable || attempt >= policy.max_retries {
            return result;
        }

        let delay = policy.delay_for(attempt);
        match &result {
            Ok(response) => tracing::debug!(
                "HTTP {} for {}, retry {}/{} in {:?}",
                response.status,
                request.url,
                attempt + 1,
                policy.max_retries,
                delay
            ),
            Err(e) => tracing::debug!(
                "{}, retry {}/{} in {:?}",
                e,
                attempt + 1,
                policy.max_retries,
                delay
            ),
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a timeout a fixed number of times, then answers 200
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetch for Flaky {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Timeout {
                    url: request.url.clone(),
                });
            }
            Ok(FetchResponse {
                url: request.url.clone(),
                final_url: request.url.clone(),
                status: 200,
                content_type: "text/html".to_string(),
                body: "<html></html>".to_string(),
                last_modified: None,
                retry_after: None,
                elapsed: Duration::ZERO,
                rendered: false,
            })
        }
    }

    #[test]
    fn test_multiplicative_delays() {
        let policy = RetryPolicy::multiplicative(3, Duration::from_millis(100), 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        let fixed = RetryPolicy::fixed(3, Duration::from_millis(100));
        assert_eq!(fixed.delay_for(2), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_recovers_within_budget() {
        let fetcher = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let result = fetch_with_retry(&fetcher, &FetchRequest::new("https://example.com/"), &policy).await;
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_is_finite() {
        let fetcher = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let result = fetch_with_retry(&fetcher, &FetchRequest::new("https://example.com/"), &policy).await;
        assert!(matches!(result, Err(FetchError::Timeout { .. })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }
}
