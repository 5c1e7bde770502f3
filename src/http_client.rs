//! HTTP client module for fetching indicator sources
//!
//! Every request carries a descriptive User-Agent and a bounded timeout.
//! Failures are reported as [`FetchError`] so callers can absorb them at the
//! indicator boundary.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of a single upstream request
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request failed with status: {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("malformed payload from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    /// Short failure class, used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Transport { .. } => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Malformed { .. } => "malformed",
        }
    }

    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else {
            FetchError::Transport { url: url.to_string(), source: err }
        }
    }
}

/// Source of raw upstream payloads
///
/// Implemented by [`HttpClient`]; tests substitute canned responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// GET `url` and parse the body as JSON
    async fn get_json(&self, url: &str) -> Result<Value, FetchError>;

    /// GET `url` and return the body as text
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/html;q=0.9, */*;q=0.8"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    async fn get_ok(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        debug!("GET {}", url);

        let response = self.client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetch for HttpClient {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.get_ok(url).await?;
        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                FetchError::Malformed { url: url.to_string(), reason: e.to_string() }
            } else {
                FetchError::from_reqwest(url, e)
            }
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get_ok(url).await?;
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!("Received {} bytes from {}", text.len(), url);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = FetchError::Status { url: "http://x".to_string(), status: 503 };
        assert_eq!(err.kind(), "status");
        assert_eq!(err.to_string(), "HTTP request failed with status: 503 for http://x");

        let err = FetchError::Malformed { url: "http://x".to_string(), reason: "eof".to_string() };
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_client_rejects_invalid_user_agent() {
        assert!(HttpClient::new("bad\nagent", Duration::from_secs(1)).is_err());
        assert!(HttpClient::new("market-pulse/0.1", Duration::from_secs(1)).is_ok());
    }
}
