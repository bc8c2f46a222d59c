//! Configuration management for the build server

pub mod schema;

pub use schema::ServerConfig;

use crate::error::{OffbuildError, OffbuildResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Loads server configuration from an optional TOML file
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a config manager; `None` means built-in defaults only
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    /// Load configuration, falling back to defaults if no file is set or
    /// the file does not exist
    pub async fn load(&self) -> OffbuildResult<ServerConfig> {
        match &self.config_path {
            Some(path) if path.exists() => self.load_from_file(path).await,
            Some(path) => {
                debug!("Config file {} not found, using defaults", path.display());
                Ok(ServerConfig::default())
            }
            None => Ok(ServerConfig::default()),
        }
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> OffbuildResult<ServerConfig> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| OffbuildError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| OffbuildError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Validate settings that cannot be expressed in the schema
pub fn validate(config: &ServerConfig) -> OffbuildResult<()> {
    match (&config.listen.tls_cert, &config.listen.tls_key) {
        (Some(_), None) | (None, Some(_)) => {
            return Err(OffbuildError::Config(
                "TLS requires both a certificate and a key".to_string(),
            ))
        }
        _ => {}
    }

    if config.session.timeout_secs == 0 {
        return Err(OffbuildError::Config(
            "session timeout must be at least one second".to_string(),
        ));
    }

    match config.general.log_format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(OffbuildError::Config(format!(
            "unknown log format {other:?}; expected \"text\" or \"json\""
        ))),
    }
}
