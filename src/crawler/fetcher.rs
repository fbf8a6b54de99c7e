//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Pacing every request through the shared rate limiter
//! - Retrying transient failures with exponential backoff
//! - Error classification

use crate::config::{Config, UserAgentConfig};
use crate::limiter::RateLimiter;
use crate::retry::{RetryError, RetryPolicy};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure of a single page fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP 429 Too Many Requests for {url}")]
    RateLimited { url: String },

    #[error("HTTP {status} server error for {url}")]
    Server { url: String, status: u16 },

    #[error("HTTP {status} for {url}")]
    Client { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {source}")]
    Connect { url: String, source: reqwest::Error },

    #[error("HTTP error for {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Failed to read body of {url}: {source}")]
    Body { url: String, source: reqwest::Error },

    #[error("Expected HTML from {url}, got '{content_type}'")]
    ContentMismatch { url: String, content_type: String },
}

impl FetchError {
    /// Whether another attempt may succeed
    ///
    /// | Condition | Retry? |
    /// |-----------|--------|
    /// | HTTP 429 | yes |
    /// | HTTP 5xx | yes |
    /// | Other 4xx | no |
    /// | Timeout | no |
    /// | Connection refused / TLS | no |
    /// | Body read error, non-HTML content | no |
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Server { .. })
    }

    /// HTTP status code, when the failure came from a response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,

    /// HTTP status code
    pub status_code: u16,

    /// Content-Type header value (empty when absent)
    pub content_type: String,

    /// Page body content
    pub body: String,
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use sense_crawler::config::UserAgentConfig;
/// use sense_crawler::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SenseCrawler".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://sense-typing.example.com/about".to_string(),
///     contact_email: "crawler@sense-typing.example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages through a shared rate limiter and a retry policy
///
/// Every attempt, including retries, first takes a token from the limiter.
/// A 429 response escalates the limiter's backoff before the retryable error
/// is handed back to the retry loop; any 2xx response resets it.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            retry,
        }
    }

    /// Builds the client, limiter and retry policy described by `config`
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            build_http_client(&config.user_agent)?,
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            RetryPolicy::from_config(&config.retry),
        ))
    }

    /// The limiter shared by all requests of this fetcher
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetches `url`, retrying transient failures
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - A 2xx HTML response
    /// * `Err(FetchError)` - The terminal failure, unchanged from the last attempt
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.retry
            .retry_if(|| self.fetch_once(url), FetchError::is_retryable)
            .await
    }

    /// Like [`fetch_page`](Self::fetch_page), abandoning the fetch when `cancel` fires
    pub async fn fetch_page_or_cancel(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, RetryError<FetchError>> {
        self.retry
            .retry_if_or_cancel(cancel, || self.fetch_once(url), FetchError::is_retryable)
            .await
    }

    /// One paced request, no retries
    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_request_error(url, e))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.limiter.rate_limited();
            return Err(FetchError::RateLimited {
                url: url.to_string(),
            });
        }

        if status.is_server_error() {
            return Err(FetchError::Server {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Client {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        self.limiter.success();

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(FetchError::ContentMismatch {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            source: e,
        })?;

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Classifies a transport-level reqwest error
fn classify_request_error(url: &str, error: reqwest::Error) -> FetchError {
    let url = url.to_string();
    if error.is_timeout() {
        FetchError::Timeout { url }
    } else if error.is_connect() {
        FetchError::Connect { url, source: error }
    } else {
        FetchError::Network { url, source: error }
    }
}
