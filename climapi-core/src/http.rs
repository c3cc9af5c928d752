//! Retrying HTTP client shared by every network provider.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{ErrorKind, FetchError};

const USER_AGENT: &str = concat!("climapi/", env!("CARGO_PKG_VERSION"));

/// Timeout and retry settings for a single provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Hard timeout of one attempt.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Sleep before attempt `n + 1` is `backoff_base * n`.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(cfg: &HttpConfig) -> Self {
        Self {
            timeout: cfg.request_timeout(),
            max_retries: cfg.max_retries,
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
        }
    }
}

/// GET client with per-attempt timeout and linear backoff on transient failures.
///
/// Holds no per-call state, so one instance (or clones of it) can serve any
/// number of concurrent provider calls.
#[derive(Debug, Clone)]
pub struct RetryingHttpClient {
    http: Client,
    policy: RetryPolicy,
}

impl RetryingHttpClient {
    pub fn new(policy: RetryPolicy) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| FetchError::configuration(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self { http, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `url` with `params` as query string and return the raw body.
    ///
    /// Retryable failures (timeouts, network errors, 429 and 5xx responses)
    /// are retried up to `max_retries` times. Anything else fails right away.
    /// Once retries are exhausted the last error is returned unchanged.
    pub async fn fetch(
        &self,
        url: &str,
        params: &[(&str, String)],
        headers: Option<&HeaderMap>,
    ) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.attempt(url, params, headers).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt <= self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    debug!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying provider request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(url, attempts = attempt, error = %err, "giving up on provider request");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// [`fetch`](Self::fetch) and decode the body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
        headers: Option<&HeaderMap>,
    ) -> Result<T, FetchError> {
        let body = self.fetch(url, params, headers).await?;
        serde_json::from_slice(&body).map_err(|err| {
            FetchError::unparseable(format!(
                "Failed to parse JSON from {url}: {err} (body: {})",
                truncate_body(&String::from_utf8_lossy(&body))
            ))
        })
    }

    async fn attempt(
        &self,
        url: &str,
        params: &[(&str, String)],
        headers: Option<&HeaderMap>,
    ) -> Result<Vec<u8>, FetchError> {
        let mut req = self.http.get(url).query(params).timeout(self.policy.timeout);
        if let Some(headers) = headers {
            req = req.headers(headers.clone());
        }

        let res = req.send().await.map_err(FetchError::from)?;

        let status = res.status();
        let body = res.bytes().await.map_err(FetchError::from)?;

        if !status.is_success() {
            return Err(FetchError::new(
                ErrorKind::HttpStatus(status.as_u16()),
                format!(
                    "Request to {url} failed with status {status}: {}",
                    truncate_body(&String::from_utf8_lossy(&body)),
                ),
            ));
        }

        Ok(body.to_vec())
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
