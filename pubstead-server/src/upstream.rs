//! Live fetches from the public registry, used in proxy mode.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::error::{AppError, AppResult, RegistryError, RegistryResult};

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// HTTP client for the public registry.
///
/// Every failure (connection error, timeout, non-success status, unreadable
/// body) is reported as [`RegistryError::NotFound`] so a flaky upstream looks
/// like a missing package rather than a server error.
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("pubstead/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> RegistryResult<UpstreamResponse> {
        let not_found = || RegistryError::NotFound(format!("upstream {url}"));
        debug!(url = %url, "Fetching from upstream");

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Upstream request failed");
            not_found()
        })?;

        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "Upstream returned non-success");
            return Err(not_found());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to read upstream body");
            not_found()
        })?;

        info!(url = %url, size = body.len(), "Relayed upstream response");
        Ok(UpstreamResponse { content_type, body })
    }
}
