//! Per-build scratch trees
//!
//! A scratch tree is created under the server's scratch directory for one
//! build and removed when its guard is dropped, on every exit path. Files in
//! the tree are hard links to cache entries, so removing the tree never
//! touches cache-owned bytes.

use crate::error::{OffbuildError, OffbuildResult};
use crate::session::BuildId;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Guard owning a scratch directory; removes it on drop
#[derive(Debug)]
pub struct ScratchTree {
    root: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchTree {
    /// Create `<scratch_dir>/<id>.<random>` as a new, empty directory
    pub async fn create(scratch_dir: &Path, id: &BuildId) -> OffbuildResult<Self> {
        tokio::fs::create_dir_all(scratch_dir).await.map_err(|e| {
            OffbuildError::io(format!("creating {}", scratch_dir.display()), e)
        })?;

        let parent = scratch_dir.to_path_buf();
        let prefix = format!("{id}.");
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&parent)
        })
        .await
        .map_err(|e| OffbuildError::io("creating scratch tree", std::io::Error::other(e)))?
        .map_err(|e| {
            OffbuildError::io(format!("creating scratch tree in {}", scratch_dir.display()), e)
        })?;

        // Toolchains get an absolute root regardless of how the data dir was given.
        let root = tokio::fs::canonicalize(dir.path()).await.map_err(|e| {
            OffbuildError::io(format!("resolving scratch tree {}", dir.path().display()), e)
        })?;

        debug!("Created scratch tree {}", root.display());
        Ok(Self {
            root,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Remove the tree now, off the async workers, and wait for it
    pub async fn remove(mut self) {
        if let Some(dir) = self.dir.take() {
            let root = self.root.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || close_tree(dir, &root)).await {
                warn!("Scratch tree removal task failed: {}", e);
            }
        }
    }
}

impl Drop for ScratchTree {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let root = std::mem::take(&mut self.root);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || close_tree(dir, &root));
            }
            Err(_) => close_tree(dir, &root),
        }
    }
}

fn close_tree(dir: TempDir, root: &Path) {
    match dir.close() {
        Ok(()) => debug!("Removed scratch tree {}", root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove scratch tree {}: {}", root.display(), e),
    }
}

/// Remove leftovers of builds interrupted by a previous crash
pub async fn clear_stale(scratch_dir: &Path) -> OffbuildResult<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(scratch_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(OffbuildError::io("reading scratch directory", e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| OffbuildError::io("reading scratch entry", e))?
    {
        let path = entry.path();
        let result = if path.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|e| OffbuildError::io(format!("removing {}", path.display()), e))?;
        removed += 1;
    }

    Ok(removed)
}
