use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchError;

/// Raw provider response before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }
}

/// HTTP seam between the fetcher and the provider
///
/// Network-level failures are returned as `FetchError`; status codes and
/// bodies are returned as-is and classified by the fetcher.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<ProviderResponse, FetchError>;
}

/// reqwest-backed transport used in production
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("market-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Permanent(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<ProviderResponse, FetchError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                FetchError::Permanent(format!("invalid request: {}", e.without_url()))
            } else {
                FetchError::Transient(format!("network error: {}", e.without_url()))
            }
        })?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read body: {}", e.without_url())))?;

        Ok(ProviderResponse { status, body })
    }
}
