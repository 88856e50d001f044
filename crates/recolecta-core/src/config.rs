use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file failures; both variants carry the stable `E1001` code.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Map to the stable machine-readable code.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        ErrorCode::ConfigParseError
    }
}

/// Service configuration, loaded from a TOML file. Every field has a
/// default so a missing file yields a working local setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint assignment notices are POSTed to. `None` falls
    /// back to log-only notification.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("recolecta.sqlite3")
}

const fn default_notify_timeout_secs() -> u64 {
    5
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.exists() {
        return Ok(ServiceConfig::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{ServiceConfig, load};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = load(&dir.path().join("recolecta.toml")).expect("load");

        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.store.path.to_str(), Some("recolecta.sqlite3"));
        assert!(config.notify.webhook_url.is_none());
        assert_eq!(config.notify.timeout_secs, 5);
    }

    #[test]
    fn partial_file_fills_the_rest_with_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("recolecta.toml");
        std::fs::write(
            &path,
            "[server]\nbind = \"127.0.0.1:8080\"\n\n[notify]\nwebhook_url = \"http://hub.local/notify\"\n",
        )
        .expect("write config");

        let config = load(&path).expect("load");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("http://hub.local/notify")
        );
        assert_eq!(config.store.path.to_str(), Some("recolecta.sqlite3"));
    }

    #[test]
    fn malformed_file_carries_the_config_code() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("recolecta.toml");
        std::fs::write(&path, "server = ").expect("write config");

        let err = load(&path).expect_err("malformed file must fail");
        assert!(matches!(err, super::ConfigError::Parse { .. }));
        assert_eq!(err.error_code().code(), "E1001");
        assert!(err.to_string().contains("recolecta.toml"));
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = ServiceConfig::default();
        let rendered = toml::to_string(&config).expect("serialize");
        let reparsed: ServiceConfig = toml::from_str(&rendered).expect("reparse");
        assert_eq!(reparsed.server.bind, config.server.bind);
    }
}
