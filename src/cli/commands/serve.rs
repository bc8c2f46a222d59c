//! Serve command - run the build server

use crate::cli::args::ServerCli;
use crate::config::{self, ConfigManager, ServerConfig};
use crate::error::OffbuildResult;
use crate::server::Server;
use tracing::info;

/// Load the configuration file (if any) and apply command-line overrides
pub async fn load_config(cli: &ServerCli) -> OffbuildResult<ServerConfig> {
    let manager = ConfigManager::new(cli.config.clone());
    let mut config = manager.load().await?;
    cli.apply(&mut config);
    config::validate(&config)?;
    Ok(config)
}

/// Execute the serve command; returns when the server shuts down
pub async fn execute(config: &ServerConfig) -> OffbuildResult<()> {
    info!(
        addr = %config.listen.addr,
        tls = config.listen.tls_cert.is_some(),
        session_timeout_secs = config.session.timeout_secs,
        "Starting offbuild-server {}",
        env!("CARGO_PKG_VERSION")
    );

    let server = Server::new(config).await?;
    server.serve(&config.listen).await
}
