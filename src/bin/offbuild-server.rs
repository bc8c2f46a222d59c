//! offbuild-server - remote build service
//!
//! Serves the build protocol over HTTP (or HTTPS with a certificate),
//! caching uploaded sources under the data directory.

use clap::Parser;
use console::style;
use offbuild::cli::ServerCli;
use offbuild::error::OffbuildResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> OffbuildResult<()> {
    let cli = ServerCli::parse();
    let config = offbuild::cli::commands::serve::load_config(&cli).await?;

    // RUST_LOG wins; otherwise info, or debug with -v
    let default = if cli.verbose > 0 {
        "offbuild=debug"
    } else {
        "offbuild=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    offbuild::cli::commands::serve(&config).await
}
