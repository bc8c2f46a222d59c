//! Compiler backend abstraction
//!
//! Provides a trait for the toolchain-specific parts of a build so the
//! orchestrator's control flow stays the same for any toolchain or platform.

use crate::cache::ContentCache;
use crate::error::OffbuildResult;
use crate::model::{BuildRequest, Environment};
use crate::session::BuildId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result of one toolchain invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainOutput {
    /// Whether the toolchain exited successfully
    pub success: bool,

    /// Exit code, if the process was not killed by a signal
    pub code: Option<i32>,

    /// Standard output and standard error, interleaved as produced
    pub combined: Vec<u8>,
}

/// Abstract compiler backend interface
///
/// A build runs `assemble_tree`, then `invoke`, then (on success)
/// `collect_result`, all against the same scratch root.
#[async_trait]
pub trait CompilerBackend: Send + Sync {
    /// Populate `root` with the request's source files, taken from `cache`
    async fn assemble_tree(
        &self,
        cache: &ContentCache,
        request: &BuildRequest,
        root: &Path,
    ) -> OffbuildResult<()>;

    /// Run the toolchain in `root`, producing an artifact named after `id`
    async fn invoke(
        &self,
        root: &Path,
        id: &BuildId,
        request: &BuildRequest,
    ) -> OffbuildResult<ToolchainOutput>;

    /// Locate the artifact produced by a successful `invoke`
    async fn collect_result(&self, root: &Path, id: &BuildId) -> OffbuildResult<PathBuf>;

    /// Target platform and toolchain version this backend builds for
    async fn environment(&self) -> OffbuildResult<Environment>;

    /// Human-readable toolchain version string
    async fn version(&self) -> OffbuildResult<String>;

    /// Get the human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}
