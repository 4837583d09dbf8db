//! Backend connection configuration.
//!
//! Configuration priority: config file under the user config dir, then
//! environment variables, then built-in defaults.

use rill_core::error::{RillError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_BASE_URL: &str = "http://localhost:3001";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HISTORY_CONCURRENCY: usize = 8;

/// Connection settings for the completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Connect timeout in seconds. The streaming response itself has no
    /// overall deadline.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound on concurrent transcript fetches during cross-session
    /// history loading.
    #[serde(default = "default_history_concurrency")]
    pub history_concurrency: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_history_concurrency() -> usize {
    DEFAULT_HISTORY_CONCURRENCY
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            history_concurrency: default_history_concurrency(),
        }
    }
}

impl BackendConfig {
    /// Loads configuration from `<config dir>/rill/config.toml`.
    ///
    /// Priority:
    /// 1. config file, when present
    /// 2. `RILL_BACKEND_URL` environment variable (overrides the file)
    /// 3. built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error only when a config file exists but cannot be read
    /// or parsed; a missing file falls through to defaults.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_path(&path)?,
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var("RILL_BACKEND_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }

        Ok(config)
    }

    /// Loads configuration from an explicit TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| RillError::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        })
    }

    fn config_path() -> Option<std::path::PathBuf> {
        Some(dirs::config_dir()?.join("rill").join("config.toml"))
    }

    /// Joins an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    }

    #[test]
    fn test_from_path_with_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"http://backend:9000\"").unwrap();

        let config = BackendConfig::from_path(file.path()).unwrap();
        assert_eq!(config.base_url, "http://backend:9000");
        // Unspecified fields keep their defaults.
        assert_eq!(config.history_concurrency, DEFAULT_HISTORY_CONCURRENCY);
    }

    #[test]
    fn test_from_path_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = [not toml").unwrap();
        assert!(BackendConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let config = BackendConfig {
            base_url: "http://backend:9000/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint("/api/chat"),
            "http://backend:9000/api/chat"
        );
    }
}
