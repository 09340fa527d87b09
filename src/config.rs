//! Client configuration.
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8080"   # console backend
//! timeout_secs = 30                    # per-request timeout
//!
//! [storage]
//! token_path = "/var/lib/console/session.toml"   # optional
//! ```
//!
//! Environment overrides: `CONSOLE_BASE_URL`, `CONSOLE_TOKEN_PATH`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::token_store::FileTokenStore;

/// Overrides `server.base_url`.
pub const BASE_URL_ENV: &str = "CONSOLE_BASE_URL";
/// Overrides `storage.token_path`.
pub const TOKEN_PATH_ENV: &str = "CONSOLE_TOKEN_PATH";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend connection settings
    pub server: ServerConfig,
    /// Durable session storage
    pub storage: StorageConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL, e.g. `http://localhost:8080`
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Where the session token is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Token file; the platform config directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Examples
    ///
    /// ```
    /// use console_access::ClientConfig;
    ///
    /// let config = ClientConfig::from_toml_str("[server]\nbase_url = \"https://console.internal\"").unwrap();
    /// assert_eq!(config.server.base_url, "https://console.internal");
    /// assert_eq!(config.server.timeout_secs, 30);
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with the process environment applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies `CONSOLE_*` overrides looked up through `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = present(BASE_URL_ENV) {
            self.server.base_url = url.trim().to_string();
        }
        if let Some(path) = present(TOKEN_PATH_ENV) {
            self.storage.token_path = Some(PathBuf::from(path));
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "server.base_url",
                message: format!("'{url}' is not an http(s) URL"),
            });
        }
        if self.server.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "server.timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Token file to use.
    pub fn token_path(&self) -> PathBuf {
        self.storage
            .token_path
            .clone()
            .unwrap_or_else(FileTokenStore::default_path)
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }
}
