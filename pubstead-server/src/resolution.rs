//! # Resolution Policy
//!
//! Decides whether a read is answered locally or handed to the public
//! registry. A local hit always wins. A local miss falls through to the same
//! path upstream; only when upstream fallback is disabled does the caller see
//! `NotFound`.

use tracing::debug;

use crate::config::{Config, UpstreamMode};
use crate::error::RegistryResult;

/// Where a read should be served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Local(T),
    /// Absolute URL of the equivalent upstream resource.
    Upstream(String),
}

#[derive(Debug, Clone)]
pub struct ResolutionPolicy {
    upstream_url: String,
    mode: UpstreamMode,
    enabled: bool,
    tool_marker: String,
}

impl ResolutionPolicy {
    pub fn new(
        upstream_url: impl Into<String>,
        mode: UpstreamMode,
        enabled: bool,
        tool_marker: impl Into<String>,
    ) -> Self {
        Self {
            upstream_url: upstream_url.into().trim_end_matches('/').to_string(),
            mode,
            enabled,
            tool_marker: tool_marker.into().to_lowercase(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.upstream.url.clone(),
            config.upstream.mode,
            config.upstream.enabled,
            config.client.tool_user_agent.clone(),
        )
    }

    pub fn mode(&self) -> UpstreamMode {
        self.mode
    }

    pub fn upstream_base(&self) -> &str {
        &self.upstream_url
    }

    /// Upstream URL for a local request path such as `/api/packages/http`.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{path_and_query}", self.upstream_url)
        } else {
            format!("{}/{path_and_query}", self.upstream_url)
        }
    }

    /// Turn a local lookup into a [`Resolution`].
    ///
    /// `NotFound` becomes [`Resolution::Upstream`] while fallback is enabled;
    /// every other error propagates untouched.
    pub fn resolve<T>(
        &self,
        local: RegistryResult<T>,
        path_and_query: &str,
    ) -> RegistryResult<Resolution<T>> {
        match local {
            Ok(found) => Ok(Resolution::Local(found)),
            Err(e) if e.is_not_found() && self.enabled => {
                debug!(path = %path_and_query, "Local miss, deferring upstream");
                Ok(Resolution::Upstream(self.upstream_url(path_and_query)))
            }
            Err(e) => Err(e),
        }
    }

    /// Whether a request's `User-Agent` identifies the package-manager CLI.
    pub fn is_tool_client(&self, user_agent: Option<&str>) -> bool {
        !self.tool_marker.is_empty()
            && user_agent.is_some_and(|ua| ua.to_lowercase().contains(&self.tool_marker))
    }
}
