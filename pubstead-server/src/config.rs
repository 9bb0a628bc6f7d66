//! # Configuration Management
//!
//! Server configuration, loaded from an optional JSON file and then overridden
//! by command-line flags. Every section falls back to its defaults, so a file
//! only needs the keys it changes:
//!
//! ```json
//! {
//!   "server": { "port": 8080, "public_url": "https://pub.internal.example.com" },
//!   "storage": { "backend": "disk", "data_dir": "/var/lib/pubstead" },
//!   "upstream": { "mode": "proxy", "timeout_secs": 3 },
//!   "security": { "tokens": { "s3cr3t": "ci@example.com" } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::validation::DEFAULT_MAX_UPLOAD_SIZE;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_UPSTREAM_URL: &str = "https://pub.dev";
pub const DEFAULT_UPLOADER: &str = "test@example.com";
pub const DEFAULT_TOOL_USER_AGENT: &str = "dart pub";
/// Read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "pubstead.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL used in generated links. Derived from
    /// `host` and `port` when unset.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    #[default]
    Disk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Disk,
            data_dir: std::env::temp_dir().join("pubstead"),
        }
    }
}

/// How read misses reach the public registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    /// Answer with a redirect to the same path upstream.
    #[default]
    Redirect,
    /// Fetch the upstream response and relay it.
    Proxy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    pub mode: UpstreamMode,
    pub timeout_secs: u64,
    /// When false, read misses are plain 404s.
    pub enabled: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            mode: UpstreamMode::Redirect,
            timeout_secs: 5,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted archive, in bytes.
    pub max_upload_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Identity every request acts as when no tokens are configured.
    pub default_uploader: String,
    /// Bearer token to email. When non-empty, requests must present one.
    pub tokens: BTreeMap<String, String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            default_uploader: DEFAULT_UPLOADER.to_string(),
            tokens: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Substring of `User-Agent` that identifies the package-manager CLI.
    pub tool_user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tool_user_agent: DEFAULT_TOOL_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from file, or the defaults if the file doesn't exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Base URL for links handed to clients, without a trailing slash.
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = match self.server.host.as_str() {
                    "0.0.0.0" | "::" | "" => "localhost",
                    host => host,
                };
                format!("http://{host}:{}", self.server.port)
            }
        }
    }
}
