//! Filesystem-backed content-addressed cache
//!
//! Entries live at `<root>/<hash[..2]>/<hash[2..]>`. Uploads are written to a
//! private temporary file in the cache root, verified, and then renamed into
//! place, so readers never observe a partially written entry. No in-memory
//! lock is taken: rename is atomic, and two uploads of the same hash carry the
//! same bytes.

use crate::cache::hash::{ContentHash, ContentHasher};
use crate::error::{OffbuildError, OffbuildResult};
use crate::model::{File, Package};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Read buffer size for uploads
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Prefix for in-flight upload files in the cache root
const TEMP_PREFIX: &str = ".upload-";

/// Content-addressed blob store
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    /// Open a cache rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> OffbuildResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| OffbuildError::io(format!("creating cache dir {}", root.display()), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path of the entry for `hash`
    pub fn path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.prefix()).join(hash.remainder())
    }

    /// Whether an entry for `hash` has been published
    pub async fn contains(&self, hash: &ContentHash) -> OffbuildResult<bool> {
        let path = self.path(hash);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| OffbuildError::io(format!("checking cache entry {}", path.display()), e))
    }

    /// Store the bytes read from `reader` under the declared `hash`.
    ///
    /// The bytes are hashed as they arrive. If the digest differs from
    /// `hash` the upload is rejected with [`OffbuildError::ContentMismatch`]
    /// and nothing is published.
    pub async fn put<R>(&self, hash: &ContentHash, mut reader: R) -> OffbuildResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        // Dropping the NamedTempFile removes it on every error path.
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| OffbuildError::io("creating upload temp file", e))?;

        let std_file = temp
            .reopen()
            .map_err(|e| OffbuildError::io("opening upload temp file", e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut written = 0u64;

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| OffbuildError::io("reading upload body", e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .await
                .map_err(|e| OffbuildError::io("writing upload temp file", e))?;
            written += n as u64;
        }

        file.flush()
            .await
            .map_err(|e| OffbuildError::io("flushing upload temp file", e))?;
        drop(file);

        let actual = hasher.finalize();
        if &actual != hash {
            debug!(declared = %hash, %actual, "Rejecting upload with mismatched content");
            return Err(OffbuildError::ContentMismatch {
                expected: hash.to_string(),
                actual: actual.to_string(),
            });
        }

        let dest = self.path(hash);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OffbuildError::io(format!("creating cache shard {}", parent.display()), e)
            })?;
        }

        temp.persist(&dest).map_err(|e| {
            OffbuildError::io(format!("publishing cache entry {}", dest.display()), e.error)
        })?;

        info!(hash = %hash, bytes = written, "Cached file");
        Ok(written)
    }

    /// Return, per package, the files whose entries are not in the cache.
    ///
    /// Packages with nothing missing are omitted. The answer may be stale by
    /// the time the caller acts on it; a concurrent upload only turns a
    /// "missing" into a redundant upload.
    pub async fn find_missing(&self, packages: &[Package]) -> OffbuildResult<Vec<Package>> {
        let mut missing = Vec::new();

        for pkg in packages {
            let mut files: Vec<File> = Vec::new();
            for file in &pkg.files {
                if !self.contains(&file.hash).await? {
                    files.push(file.clone());
                }
            }

            if !files.is_empty() {
                missing.push(Package {
                    name: pkg.name.clone(),
                    files,
                });
            }
        }

        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn cache() -> (TempDir, ContentCache) {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::open(dir.path().join("cache")).await.unwrap();
        (dir, cache)
    }

    fn entries_in(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for shard in std::fs::read_dir(root).unwrap() {
            let shard = shard.unwrap().path();
            if shard.is_dir() {
                for entry in std::fs::read_dir(&shard).unwrap() {
                    out.push(entry.unwrap().path());
                }
            } else {
                out.push(shard);
            }
        }
        out
    }

    #[tokio::test]
    async fn put_publishes_at_canonical_path() {
        let (_dir, cache) = cache().await;
        let content = b"package main\n";
        let hash = ContentHash::of_bytes(content);

        let written = cache.put(&hash, &content[..]).await.unwrap();

        assert_eq!(written, content.len() as u64);
        let path = cache.path(&hash);
        assert_eq!(
            path,
            cache.root().join(hash.prefix()).join(hash.remainder())
        );
        assert_eq!(std::fs::read(&path).unwrap(), content);
    }

    #[tokio::test]
    async fn put_twice_is_idempotent() {
        let (_dir, cache) = cache().await;
        let content = b"same bytes";
        let hash = ContentHash::of_bytes(content);

        cache.put(&hash, &content[..]).await.unwrap();
        cache.put(&hash, &content[..]).await.unwrap();

        assert_eq!(entries_in(cache.root()), vec![cache.path(&hash)]);
        assert_eq!(std::fs::read(cache.path(&hash)).unwrap(), content);
    }

    #[tokio::test]
    async fn put_mismatch_leaves_nothing() {
        let (_dir, cache) = cache().await;
        let declared = ContentHash::of_bytes(b"what the client claims");

        let err = cache.put(&declared, &b"something else"[..]).await.unwrap_err();

        assert!(matches!(err, OffbuildError::ContentMismatch { .. }));
        assert!(!cache.contains(&declared).await.unwrap());
        assert!(entries_in(cache.root()).is_empty(), "temp file left behind");
    }

    #[tokio::test]
    async fn concurrent_puts_of_same_hash() {
        let (_dir, cache) = cache().await;
        let content = vec![7u8; 256 * 1024];
        let hash = ContentHash::of_bytes(&content);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let hash = hash.clone();
            let content = content.clone();
            tasks.push(tokio::spawn(async move {
                cache.put(&hash, &content[..]).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(entries_in(cache.root()), vec![cache.path(&hash)]);
        assert_eq!(std::fs::read(cache.path(&hash)).unwrap(), content);
    }

    #[tokio::test]
    async fn find_missing_reports_only_absent_files() {
        let (_dir, cache) = cache().await;
        let cached = ContentHash::of_bytes(b"cached");
        let absent = ContentHash::of_bytes(b"absent");
        cache.put(&cached, &b"cached"[..]).await.unwrap();

        let packages = vec![
            Package {
                name: "lib".into(),
                files: vec![File {
                    name: "lib.go".into(),
                    hash: cached.clone(),
                }],
            },
            Package {
                name: "hello".into(),
                files: vec![
                    File {
                        name: "main.go".into(),
                        hash: absent.clone(),
                    },
                    File {
                        name: "util.go".into(),
                        hash: cached,
                    },
                ],
            },
        ];

        let missing = cache.find_missing(&packages).await.unwrap();

        assert_eq!(
            missing,
            vec![Package {
                name: "hello".into(),
                files: vec![File {
                    name: "main.go".into(),
                    hash: absent,
                }],
            }]
        );
    }

    #[tokio::test]
    async fn find_missing_empty_when_all_cached() {
        let (_dir, cache) = cache().await;
        let hash = ContentHash::of_bytes(b"x");
        cache.put(&hash, &b"x"[..]).await.unwrap();

        let packages = vec![Package {
            name: "x".into(),
            files: vec![File {
                name: "x.go".into(),
                hash,
            }],
        }];
        assert!(cache.find_missing(&packages).await.unwrap().is_empty());
    }
}
