//! Go toolchain backend
//!
//! Lays the build out as a GOPATH tree (`<root>/src/<import path>/<file>`)
//! and runs `go build` against it with module mode disabled.

use crate::build::backend::{CompilerBackend, ToolchainOutput};
use crate::build::output_combined;
use crate::cache::ContentCache;
use crate::error::{OffbuildError, OffbuildResult};
use crate::model::{BuildRequest, Environment};
use crate::session::BuildId;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Go toolchain found on PATH or under an explicit GOROOT
#[derive(Debug, Clone, Default)]
pub struct GoToolchain {
    goroot: Option<PathBuf>,
}

/// Subset of `go env -json` output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct GoEnv {
    goos: String,
    goarch: String,
    goversion: String,
}

impl GoToolchain {
    /// Create a backend using `go` from PATH, or `<goroot>/bin/go` if given
    pub fn new(goroot: Option<PathBuf>) -> Self {
        Self { goroot }
    }

    /// Path of the `go` binary
    pub fn go_binary(&self) -> PathBuf {
        match &self.goroot {
            Some(root) => root.join("bin").join("go"),
            None => PathBuf::from("go"),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(self.go_binary());
        if let Some(root) = &self.goroot {
            cmd.env("GOROOT", root);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Execute a `go` subcommand and return its output
    async fn exec(&self, args: &[&str]) -> OffbuildResult<std::process::Output> {
        debug!("Executing: go {:?}", args);

        self.command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| OffbuildError::command_failed(format!("go {}", args.join(" ")), e))
    }

    fn source_dir(root: &Path, package: &str) -> PathBuf {
        root.join("src").join(package)
    }
}

/// Hard-link `src` to `dest`, copying when the filesystem cannot alias.
///
/// `dest` must not exist yet: an existing destination may already be a link
/// into the cache, and writing through it would rewrite a published entry.
async fn link_or_copy(src: &Path, dest: &Path) -> OffbuildResult<()> {
    let placing = |e: std::io::Error| {
        OffbuildError::io(
            format!("placing {} at {}", src.display(), dest.display()),
            e,
        )
    };

    match tokio::fs::hard_link(src, dest).await {
        Ok(()) => Ok(()),
        Err(link_err) if links_unsupported(&link_err) => {
            debug!(
                "Hard link {} -> {} failed ({}), copying",
                src.display(),
                dest.display(),
                link_err
            );
            copy_new(src, dest).await.map_err(placing)
        }
        Err(link_err) => Err(placing(link_err)),
    }
}

fn links_unsupported(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::CrossesDevices | ErrorKind::Unsupported | ErrorKind::PermissionDenied
    )
}

/// Copy into a file created exclusively for this copy
async fn copy_new(src: &Path, dest: &Path) -> std::io::Result<()> {
    let mut reader = tokio::fs::File::open(src).await?;
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await?;
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.flush().await
}

#[async_trait]
impl CompilerBackend for GoToolchain {
    async fn assemble_tree(
        &self,
        cache: &ContentCache,
        request: &BuildRequest,
        root: &Path,
    ) -> OffbuildResult<()> {
        for pkg in &request.packages {
            let dir = Self::source_dir(root, &pkg.name);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| OffbuildError::io(format!("creating {}", dir.display()), e))?;

            for file in &pkg.files {
                link_or_copy(&cache.path(&file.hash), &dir.join(&file.name)).await?;
            }
        }

        debug!(
            packages = request.packages.len(),
            files = request.file_count(),
            "Assembled GOPATH at {}",
            root.display()
        );
        Ok(())
    }

    async fn invoke(
        &self,
        root: &Path,
        id: &BuildId,
        request: &BuildRequest,
    ) -> OffbuildResult<ToolchainOutput> {
        let mut args = vec!["build".to_string(), "-o".to_string(), id.to_string()];
        args.extend(request.flags.iter().cloned());
        args.push(request.package_name.clone());

        info!(build_id = %id, "Running: go {}", args.join(" "));

        let mut command = self.command();
        command
            .args(&args)
            .current_dir(root)
            .env("GOPATH", root)
            .env("GO111MODULE", "off");

        let (status, combined) = output_combined(command)
            .await
            .map_err(|e| OffbuildError::command_failed("go build", e))?;

        Ok(ToolchainOutput {
            success: status.success(),
            code: status.code(),
            combined,
        })
    }

    async fn collect_result(&self, root: &Path, id: &BuildId) -> OffbuildResult<PathBuf> {
        let artifact = root.join(id.as_str());
        let exists = tokio::fs::try_exists(&artifact)
            .await
            .map_err(|e| OffbuildError::io(format!("checking {}", artifact.display()), e))?;
        if !exists {
            return Err(OffbuildError::ArtifactMissing(artifact));
        }
        Ok(artifact)
    }

    async fn environment(&self) -> OffbuildResult<Environment> {
        let output = self.exec(&["env", "-json", "GOOS", "GOARCH", "GOVERSION"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OffbuildError::command_exec("go env", stderr));
        }

        let env: GoEnv = serde_json::from_slice(&output.stdout)?;
        Ok(Environment {
            os: env.goos,
            arch: env.goarch,
            toolchain_version: env.goversion,
        })
    }

    async fn version(&self) -> OffbuildResult<String> {
        let output = self.exec(&["version"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OffbuildError::command_exec("go version", stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn backend_name(&self) -> &'static str {
        "Go"
    }
}
