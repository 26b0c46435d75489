//! HTTP client shared by API and scraper sources.
//!
//! Wraps reqwest with a hard per-request timeout, a fixed retry count with
//! linear backoff, and optional rate limiting keyed by source name.

mod user_agent;

pub use user_agent::{resolve_user_agent, UserAgentMode, USER_AGENT};

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::rate_limit::RateLimiter;

/// HTTP settings shared by every outbound source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Hard timeout for a single request, in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for linear backoff between attempts, in seconds.
    pub retry_delay_secs: f64,
    /// User agent: unset to identify as umrahfare, "browser" for a browser
    /// agent, or a literal string.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 2.0,
            user_agent: None,
        }
    }
}

/// Errors from outbound HTTP requests.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Source {0} is temporarily blocked by the rate limiter")]
    Blocked(String),
}

impl HttpError {
    /// Whether another attempt could succeed.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } | Self::Blocked(_) => false,
        }
    }
}

/// HTTP client bound to one source.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    source_name: String,
    max_retries: u32,
    retry_delay: Duration,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client for a source.
    pub fn new(source_name: &str, config: &HttpConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(config.user_agent.as_deref(), source_name))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            source_name: source_name.to_string(),
            max_retries: config.max_retries,
            retry_delay: Duration::try_from_secs_f64(config.retry_delay_secs.max(0.0))
                .unwrap_or(Duration::ZERO),
            rate_limiter: None,
        })
    }

    /// Route every request through a shared rate limiter.
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// GET a URL and return the body as text.
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, HttpError> {
        let mut attempt = 0;
        loop {
            match self.attempt(url, query).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = self.retry_delay * attempt;
                    warn!(
                        "{}: request to {} failed ({}), retry {}/{} in {:?}",
                        self.source_name, url, e, attempt, self.max_retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// GET a URL and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, HttpError> {
        let body = self.get_text(url, query).await?;
        serde_json::from_str(&body).map_err(|e| HttpError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn attempt(&self, url: &str, query: &[(&str, String)]) -> Result<String, HttpError> {
        if let Some(limiter) = &self.rate_limiter {
            if limiter.is_blocked(&self.source_name).await {
                return Err(HttpError::Blocked(self.source_name.clone()));
            }
            limiter.wait_if_needed(&self.source_name).await;
            limiter.record_request(&self.source_name).await;
        }

        let result = self.send(url, query).await;

        if let Some(limiter) = &self.rate_limiter {
            match &result {
                Ok(_) => limiter.record_success(&self.source_name).await,
                Err(e) if e.is_retryable() || is_refusal(e) => {
                    limiter.record_failure(&self.source_name).await
                }
                Err(_) => {}
            }
        }

        result
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<String, HttpError> {
        debug!("{}: GET {}", self.source_name, url);
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

/// A 403 counts toward suspension but is not retried.
fn is_refusal(error: &HttpError) -> bool {
    matches!(error, HttpError::Status { status, .. } if *status == StatusCode::FORBIDDEN.as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let status = |status| HttpError::Status {
            status,
            url: "https://example.com".to_string(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(is_refusal(&status(403)));
        assert!(!HttpError::Blocked("tiket".to_string()).is_retryable());
    }

    #[test]
    fn test_client_builds_from_config() {
        let client = HttpClient::new("xotelo", &HttpConfig::default()).unwrap();
        assert_eq!(client.source_name(), "xotelo");
        assert_eq!(client.max_retries, 3);
        assert_eq!(client.retry_delay, Duration::from_secs(2));
    }
}
