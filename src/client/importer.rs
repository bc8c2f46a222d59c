//! Package importers
//!
//! An importer turns a package path and a target platform into the package's
//! import path, source directory, direct imports and source files. The
//! default implementation asks the Go toolchain via `go list -json`.

use crate::error::{OffbuildError, OffbuildResult};
use crate::model::Environment;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Import of the cgo pseudo-package; never resolved
pub const CGO_PSEUDO_IMPORT: &str = "C";

/// Operating system and architecture to resolve packages for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl From<&Environment> for Platform {
    fn from(env: &Environment) -> Self {
        Self {
            os: env.os.clone(),
            arch: env.arch.clone(),
        }
    }
}

/// One resolved package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPackage {
    /// Canonical import path
    pub import_path: String,

    /// Directory holding the package's files
    pub dir: PathBuf,

    /// Part of the toolchain's standard library
    pub standard: bool,

    /// Direct imports, as import paths
    pub imports: Vec<String>,

    /// Names of every file the build needs, relative to `dir`
    pub files: Vec<String>,
}

/// Resolves packages for the manifest builder
pub trait PackageImporter {
    fn import(&self, path: &str, platform: &Platform) -> OffbuildResult<ResolvedPackage>;
}

/// Subset of `go list -json` output
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GoListPackage {
    import_path: String,
    dir: PathBuf,
    standard: bool,
    goroot: bool,
    imports: Vec<String>,
    go_files: Vec<String>,
    cgo_files: Vec<String>,
    c_files: Vec<String>,
    #[serde(rename = "CXXFiles")]
    cxx_files: Vec<String>,
    m_files: Vec<String>,
    h_files: Vec<String>,
    s_files: Vec<String>,
    swig_files: Vec<String>,
    #[serde(rename = "SwigCXXFiles")]
    swig_cxx_files: Vec<String>,
    syso_files: Vec<String>,
}

impl From<GoListPackage> for ResolvedPackage {
    fn from(pkg: GoListPackage) -> Self {
        let files = [
            pkg.go_files,
            pkg.cgo_files,
            pkg.c_files,
            pkg.cxx_files,
            pkg.m_files,
            pkg.h_files,
            pkg.s_files,
            pkg.swig_files,
            pkg.swig_cxx_files,
            pkg.syso_files,
        ]
        .concat();

        Self {
            import_path: pkg.import_path,
            dir: pkg.dir,
            standard: pkg.standard || pkg.goroot,
            imports: pkg.imports,
            files,
        }
    }
}

/// Importer backed by `go list`
#[derive(Debug, Clone)]
pub struct GoListImporter {
    go: PathBuf,
    work_dir: Option<PathBuf>,
}

impl Default for GoListImporter {
    fn default() -> Self {
        Self {
            go: PathBuf::from("go"),
            work_dir: None,
        }
    }
}

impl GoListImporter {
    /// Use a specific `go` binary instead of the one on PATH
    pub fn with_go(mut self, go: impl Into<PathBuf>) -> Self {
        self.go = go.into();
        self
    }

    /// Resolve relative package paths against `dir`
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }
}

impl PackageImporter for GoListImporter {
    fn import(&self, path: &str, platform: &Platform) -> OffbuildResult<ResolvedPackage> {
        debug!("Resolving {} for {}/{}", path, platform.os, platform.arch);

        let mut cmd = Command::new(&self.go);
        cmd.args(["list", "-json", "--", path])
            .env("GOOS", &platform.os)
            .env("GOARCH", &platform.arch)
            .stdin(Stdio::null());
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .map_err(|e| OffbuildError::command_failed("go list", e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OffbuildError::resolution(path, stderr.trim()));
        }

        let pkg: GoListPackage = serde_json::from_slice(&output.stdout)
            .map_err(|e| OffbuildError::resolution(path, format!("bad go list output: {e}")))?;
        Ok(pkg.into())
    }
}
