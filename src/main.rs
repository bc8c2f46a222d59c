//! offbuild - remote build client
//!
//! CLI entry point: builds one package on the server named by
//! `OFFBUILD_SERVER_URL` (or `--server`).

use clap::Parser;
use console::style;
use offbuild::cli::ClientCli;
use offbuild::OffbuildError;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = ClientCli::parse();

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("offbuild=warn"),
        1 => EnvFilter::new("offbuild=info"),
        _ => EnvFilter::new("offbuild=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match offbuild::cli::commands::build(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(OffbuildError::Compile { diagnostics }) => {
            // The toolchain's own output, untouched.
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(&diagnostics);
            let _ = stderr.flush();
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}
