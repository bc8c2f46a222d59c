//! Build orchestration
//!
//! One build = assemble scratch tree -> invoke toolchain -> hand back the
//! result. The scratch tree is owned by a [`ScratchTree`] guard, so it is
//! removed whichever step fails; on success the guard travels with the
//! [`Artifact`] and the tree is removed once the artifact has been streamed.

use crate::build::backend::CompilerBackend;
use crate::build::scratch::ScratchTree;
use crate::cache::ContentCache;
use crate::error::{OffbuildError, OffbuildResult};
use crate::model::BuildRequest;
use crate::session::BuildId;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;

/// Outcome of a build that ran to completion
#[derive(Debug)]
pub enum BuildOutcome {
    /// The toolchain produced an artifact
    Success(Artifact),

    /// The toolchain rejected the source; combined output, verbatim
    CompileFailed(Vec<u8>),
}

/// A produced binary, still inside its scratch tree
#[derive(Debug)]
pub struct Artifact {
    file: tokio::fs::File,
    len: u64,
    scratch: ScratchTree,
}

impl Artifact {
    /// Size of the artifact in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stream the artifact's bytes; the scratch tree is removed when the
    /// stream is dropped.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let Artifact { file, scratch, .. } = self;
        ReaderStream::new(file).map(move |chunk| {
            let _tree = &scratch;
            chunk
        })
    }

    /// Read the whole artifact into memory
    pub async fn into_bytes(self) -> OffbuildResult<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let Artifact { mut file, len, scratch } = self;
        let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| OffbuildError::io("reading artifact", e))?;
        scratch.remove().await;
        Ok(buf)
    }
}

/// Drives builds against the cache through a compiler backend
#[derive(Clone)]
pub struct Orchestrator {
    cache: ContentCache,
    backend: Arc<dyn CompilerBackend>,
    scratch_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        cache: ContentCache,
        backend: Arc<dyn CompilerBackend>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            backend,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn backend(&self) -> &dyn CompilerBackend {
        self.backend.as_ref()
    }

    /// Build `request` as build `id`.
    ///
    /// Infrastructure failures (tree assembly, spawning the toolchain) are
    /// errors; a toolchain that runs and fails is [`BuildOutcome::CompileFailed`].
    /// Unless an artifact is returned, the scratch tree is gone by the time
    /// this returns.
    pub async fn build(&self, id: &BuildId, request: &BuildRequest) -> OffbuildResult<BuildOutcome> {
        let scratch = ScratchTree::create(&self.scratch_dir, id).await?;

        match self.run(id, request, &scratch).await {
            Ok(Ok((file, len))) => {
                info!(build_id = %id, bytes = len, "Build succeeded");
                Ok(BuildOutcome::Success(Artifact { file, len, scratch }))
            }
            Ok(Err(diagnostics)) => {
                scratch.remove().await;
                Ok(BuildOutcome::CompileFailed(diagnostics))
            }
            Err(e) => {
                scratch.remove().await;
                Err(e)
            }
        }
    }

    /// Assemble, invoke and open the artifact; `Ok(Err(_))` is a compile failure
    async fn run(
        &self,
        id: &BuildId,
        request: &BuildRequest,
        scratch: &ScratchTree,
    ) -> OffbuildResult<Result<(tokio::fs::File, u64), Vec<u8>>> {
        self.backend
            .assemble_tree(&self.cache, request, scratch.path())
            .await?;

        let output = self.backend.invoke(scratch.path(), id, request).await?;
        if !output.success {
            info!(
                build_id = %id,
                code = ?output.code,
                "{} build failed",
                self.backend.backend_name()
            );
            return Ok(Err(output.combined));
        }

        let path = self.backend.collect_result(scratch.path(), id).await?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| OffbuildError::io(format!("opening artifact {}", path.display()), e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| OffbuildError::io(format!("reading metadata of {}", path.display()), e))?
            .len();

        Ok(Ok((file, len)))
    }
}
