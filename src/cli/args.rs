//! CLI argument definitions using clap derive

use crate::config::ServerConfig;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// offbuild - build Go packages on a remote build server
///
/// Resolves the package and its dependencies locally, uploads the source
/// files the server has not seen before, and writes the binary the server
/// builds.
#[derive(Parser, Debug)]
#[command(name = "offbuild")]
#[command(author, version, about, long_about = None)]
pub struct ClientCli {
    /// Package to build (import path or relative directory)
    #[arg(default_value = ".")]
    pub package: String,

    /// Output file name (defaults to the package's last path element)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Build with the race detector
    #[arg(long)]
    pub race: bool,

    /// Linker flags, passed as -ldflags
    #[arg(long, allow_hyphen_values = true)]
    pub ldflags: Option<String>,

    /// Extra toolchain flag, passed through verbatim (repeatable)
    #[arg(long = "build-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub build_flags: Vec<String>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Build server URL
    #[arg(long, env = "OFFBUILD_SERVER_URL")]
    pub server: Option<String>,
}

impl ClientCli {
    /// Toolchain flags in the order they are passed to the build
    pub fn toolchain_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.race {
            flags.push("-race".to_string());
        }
        if let Some(ref ldflags) = self.ldflags {
            flags.push("-ldflags".to_string());
            flags.push(ldflags.clone());
        }
        flags.extend(self.build_flags.iter().cloned());
        flags
    }
}

/// Server log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// offbuild-server - build service with a content-addressed source cache
#[derive(Parser, Debug)]
#[command(name = "offbuild-server")]
#[command(author, version, about, long_about = None)]
pub struct ServerCli {
    /// Configuration file path
    #[arg(short, long, env = "OFFBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for the source cache and scratch build trees
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub addr: Option<String>,

    /// Toolchain root (GOROOT); `go` from PATH when unset
    #[arg(long)]
    pub toolchain_root: Option<PathBuf>,

    /// TLS certificate chain (PEM)
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Seconds a build stays fetchable after it begins
    #[arg(long)]
    pub session_timeout_secs: Option<u64>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Increase verbosity (-v debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl ServerCli {
    /// Override file configuration with the flags that were given
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.clone();
        }
        if let Some(ref addr) = self.addr {
            config.listen.addr = addr.clone();
        }
        if let Some(ref root) = self.toolchain_root {
            config.toolchain.root = Some(root.clone());
        }
        if let Some(ref cert) = self.tls_cert {
            config.listen.tls_cert = Some(cert.clone());
        }
        if let Some(ref key) = self.tls_key {
            config.listen.tls_key = Some(key.clone());
        }
        if let Some(secs) = self.session_timeout_secs {
            config.session.timeout_secs = secs;
        }
        if let Some(format) = self.log_format {
            config.general.log_format = format.as_str().to_string();
        }
    }
}
