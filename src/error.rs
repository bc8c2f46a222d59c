//! Error types for offbuild
//!
//! All modules use `OffbuildResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for offbuild operations
pub type OffbuildResult<T> = Result<T, OffbuildError>;

/// All errors that can occur in offbuild
#[derive(Error, Debug)]
pub enum OffbuildError {
    // Client-side resolution errors
    #[error("Cannot resolve package {package}: {reason}")]
    Resolution { package: String, reason: String },

    #[error("No build server configured")]
    ServerUrlMissing,

    // Protocol errors
    #[error("Unexpected response from {endpoint}: status {status}: {body}")]
    Protocol {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    // Cache errors
    #[error("Uploaded content hashes to {actual}, declared {expected}")]
    ContentMismatch { expected: String, actual: String },

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    // Build errors
    #[error("Build failed")]
    Compile { diagnostics: Vec<u8> },

    #[error("Unknown build: {0}")]
    UnknownSession(String),

    #[error("Invalid build id: {0}")]
    InvalidBuildId(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Toolchain did not produce {0}")]
    ArtifactMissing(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("{0}")]
    Config(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OffbuildError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a resolution error for a package
    pub fn resolution(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is the client's fault rather than the server's
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ContentMismatch { .. }
                | Self::InvalidHash(_)
                | Self::InvalidBuildId(_)
                | Self::InvalidManifest(_)
                | Self::Json(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ServerUrlMissing => Some("Set OFFBUILD_SERVER_URL or pass --server"),
            Self::UnknownSession(_) => {
                Some("Build sessions expire a few minutes after they begin; rerun the build")
            }
            Self::ContentMismatch { .. } => {
                Some("A source file changed while uploading; rerun the build")
            }
            Self::Resolution { .. } => Some("Check that `go list` succeeds for the package"),
            _ => None,
        }
    }
}
