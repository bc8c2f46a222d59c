//! Configuration schema for the build server
//!
//! Configuration is read from an optional TOML file (`--config`); every
//! value can be overridden on the command line.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default listen address
pub const DEFAULT_ADDR: &str = "localhost:6363";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,

    /// Listener settings
    pub listen: ListenConfig,

    /// Toolchain settings
    pub toolchain: ToolchainConfig,

    /// Build session settings
    pub session: SessionConfig,
}

/// General server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the cache and scratch trees
    pub data_dir: PathBuf,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("offbuild"),
            log_format: "text".to_string(),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Address to listen on (host:port)
    pub addr: String,

    /// TLS certificate chain (PEM)
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    pub tls_key: Option<PathBuf>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// Toolchain configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Explicit toolchain root (GOROOT); `go` from PATH when unset
    pub root: Option<PathBuf>,
}

/// Build session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a build session stays fetchable after `begin`
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl ServerConfig {
    /// Content cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.general.data_dir.join("cache")
    }

    /// Per-build scratch tree directory
    pub fn scratch_dir(&self) -> PathBuf {
        self.general.data_dir.join("scratch")
    }
}
