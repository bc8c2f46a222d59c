//! Build command - build a package on the remote server

use crate::cli::args::ClientCli;
use crate::client::{run_build, BuildOptions, GoListImporter, PackageImporter};
use crate::error::{OffbuildError, OffbuildResult};
use crate::ui::UiContext;
use std::path::{Path, PathBuf};
use tracing::info;

/// Execute the build command with the default `go list` importer
pub fn execute(cli: &ClientCli) -> OffbuildResult<()> {
    execute_with(cli, &GoListImporter::default())
}

/// Execute the build command with an explicit importer
pub fn execute_with(cli: &ClientCli, importer: &dyn PackageImporter) -> OffbuildResult<()> {
    let server_url = cli
        .server
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(OffbuildError::ServerUrlMissing)?;

    let output = match cli.output {
        Some(ref output) => output.clone(),
        None => default_output_name(&cli.package)?,
    };

    let options = BuildOptions {
        server_url: server_url.to_string(),
        package: cli.package.clone(),
        output,
        flags: cli.toolchain_flags(),
    };

    let summary = run_build(&options, importer, &UiContext::detect())?;
    info!(
        build_id = %summary.id,
        packages = summary.packages,
        uploaded = summary.uploaded,
        bytes = summary.bytes,
        "Built {}",
        options.output.display()
    );
    Ok(())
}

/// Output file name for a package argument.
///
/// Relative directories (`.`, `./cmd/tool`, `..`) are named after the
/// directory they point to; import paths after their last element.
pub fn default_output_name(package: &str) -> OffbuildResult<PathBuf> {
    if package.starts_with('.') {
        let dir = Path::new(package)
            .canonicalize()
            .map_err(|e| OffbuildError::resolution(package, e.to_string()))?;
        return dir
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| OffbuildError::resolution(package, "cannot name output after /"));
    }

    package
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| OffbuildError::resolution(package, "empty package path"))
}
