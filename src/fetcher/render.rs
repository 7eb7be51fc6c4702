use crate::fetcher::{Fetch, FetchError, FetchRequest, FetchResponse};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Delegates fetching to an external render-capable program
///
/// The command is invoked as `<program> [args...] <url>` and must print the
/// rendered document on stdout. A non-zero exit status is a render failure.
#[derive(Debug, Clone)]
pub struct RenderFetcher {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl RenderFetcher {
    /// Splits `command` on whitespace into program and leading arguments
    pub fn new(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

#[async_trait]
impl Fetch for RenderFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(&request.url).kill_on_drop(true);
        if let Some(ua) = &request.user_agent {
            command.env("CATALOG_SIEVE_USER_AGENT", ua);
        }

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(FetchError::Render {
                    url: request.url.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: request.url.clone(),
                })
            }
        };

        if !output.status.success() {
            return Err(FetchError::Render {
                url: request.url.clone(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(FetchResponse {
            url: request.url.clone(),
            final_url: request.url.clone(),
            status: 200,
            content_type: "text/html".to_string(),
            body: String::from_utf8_lossy(&output.stdout).into_owned(),
            last_modified: None,
            retry_after: None,
            elapsed: started.elapsed(),
            rendered: true,
        })
    }
}
