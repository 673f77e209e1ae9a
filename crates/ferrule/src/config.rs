//! Server configuration.
//!
//! Configuration is a small YAML document. Every field has a default, so an
//! empty file (or no file at all) yields a usable server.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};

/// Default timeout for server-initiated requests, in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Default log filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Configuration for a ferrule language server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerConfig {
    /// Timeout for requests the server sends to the client
    pub request_timeout_ms: u64,

    /// `tracing` filter directive used when `RUST_LOG` is not set
    pub log_filter: String,

    /// Name reported in `serverInfo`
    pub server_name: String,

    /// Version reported in `serverInfo`
    pub server_version: String,
}

impl ServerConfig {
    /// Create a configuration reporting the given server name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_name: name.into(),
            server_version: version.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "request-timeout-ms must be greater than zero".to_string(),
            ));
        }
        if self.server_name.trim().is_empty() {
            return Err(Error::Config("server-name cannot be empty".to_string()));
        }
        Ok(())
    }

    /// The default timeout for server-initiated requests
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
