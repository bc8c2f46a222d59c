//! Content hashing for the source cache
//!
//! Every source file is addressed by the SHA-256 digest of its exact bytes,
//! hex-encoded. Same bytes = same hash = same cache entry.

use crate::error::{OffbuildError, OffbuildResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

/// Hex length of a SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Number of leading hex characters used as the cache shard directory
const SHARD_PREFIX_LEN: usize = 2;

/// Hex-encoded SHA-256 digest of a file's content
///
/// Always exactly 64 lowercase hex characters; construction validates this,
/// so it is safe to slice and to use as a path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate a hex digest string
    pub fn parse(s: &str) -> OffbuildResult<Self> {
        let valid = s.len() == HASH_HEX_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(OffbuildError::InvalidHash(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Hash an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(bytes);
        hasher.finalize()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shard directory name (first two hex characters)
    pub fn prefix(&self) -> &str {
        &self.0[..SHARD_PREFIX_LEN]
    }

    /// File name within the shard directory
    pub fn remainder(&self) -> &str {
        &self.0[SHARD_PREFIX_LEN..]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = OffbuildError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Incremental SHA-256 hasher producing a [`ContentHash`]
#[derive(Default)]
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash(hex::encode(self.0.finalize()))
    }
}

/// Stream a file from disk through SHA-256
pub fn hash_file(path: &Path) -> OffbuildResult<ContentHash> {
    let mut file = File::open(path)
        .map_err(|e| OffbuildError::io(format!("opening {}", path.display()), e))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| OffbuildError::io(format!("reading {}", path.display()), e))?;

    Ok(ContentHash(hex::encode(hasher.finalize())))
}
