//! Server-side build orchestration
//!
//! Reconstructs a source tree from the content cache, drives the toolchain
//! through a [`CompilerBackend`], and hands back either the artifact or the
//! toolchain's diagnostics.

mod backend;
mod go;
mod orchestrator;
pub mod scratch;

pub use backend::{CompilerBackend, ToolchainOutput};
pub use go::GoToolchain;
pub use orchestrator::{Artifact, BuildOutcome, Orchestrator};
pub use scratch::ScratchTree;

use std::io::Read;
use std::process::ExitStatus;
use tokio::process::Command;

/// Run `command` with stdout and stderr sharing one pipe.
///
/// Returns the exit status and every byte the child wrote, in the order it
/// wrote them across both streams, undecoded.
pub(crate) async fn output_combined(mut command: Command) -> std::io::Result<(ExitStatus, Vec<u8>)> {
    let (mut reader, writer) = std::io::pipe()?;
    command.stdout(writer.try_clone()?).stderr(writer);
    let mut child = command.spawn()?;
    // The command keeps its copies of the write end open until dropped.
    drop(command);

    let collected = tokio::task::spawn_blocking(move || {
        let mut combined = Vec::new();
        reader.read_to_end(&mut combined).map(|_| combined)
    });

    let status = child.wait().await?;
    let combined = collected.await.map_err(std::io::Error::other)??;
    Ok((status, combined))
}
