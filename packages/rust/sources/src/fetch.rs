//! HTTP fetching with per-source timeouts and transient-error retry.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use newsdesk_shared::{NewsdeskError, Result, RetryPolicy, SourceConfig, retry};

/// User-Agent string for source requests.
const USER_AGENT: &str = concat!("newsdesk/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for all source adapters.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| NewsdeskError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Override the base delay between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn policy(&self, source: &SourceConfig) -> RetryPolicy {
        RetryPolicy::new(source.retry_count, self.retry_delay)
    }

    /// Fetch the source URL as text, retrying transient failures.
    pub async fn get_text(&self, source: &SourceConfig) -> Result<String> {
        let timeout = Duration::from_millis(source.timeout_ms);
        retry(self.policy(source), &source.name, || {
            self.get_once(&source.url, timeout)
        })
        .await
    }

    /// Fetch the source URL and decode it as JSON.
    ///
    /// A body that is not valid JSON is a non-transient fetch error.
    pub async fn get_json(&self, source: &SourceConfig) -> Result<serde_json::Value> {
        let body = self.get_text(source).await?;
        serde_json::from_str(&body).map_err(|e| {
            NewsdeskError::fetch(format!("{}: response is not valid JSON: {e}", source.url))
        })
    }

    async fn get_once(&self, url: &str, timeout: Duration) -> Result<String> {
        debug!(%url, "fetching source");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| NewsdeskError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsdeskError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| NewsdeskError::Network(format!("{url}: body read failed: {e}")))
    }
}
