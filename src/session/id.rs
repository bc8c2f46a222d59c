//! Build identifiers and session records

use crate::error::{OffbuildError, OffbuildResult};
use crate::model::BuildRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Random bytes in a build id
const BUILD_ID_BYTES: usize = 16;

/// Hex length of a build id
pub const BUILD_ID_HEX_LEN: usize = BUILD_ID_BYTES * 2;

/// Randomly generated identifier of one build session
///
/// 128 bits of randomness, hex-encoded (always 32 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildId(String);

impl BuildId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        let bytes: [u8; BUILD_ID_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Validate an id received from a client
    pub fn parse(s: &str) -> OffbuildResult<Self> {
        let valid = s.len() == BUILD_ID_HEX_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(OffbuildError::InvalidBuildId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BuildId {
    type Error = OffbuildError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BuildId> for String {
    fn from(id: BuildId) -> Self {
        id.0
    }
}

/// Server-side record of a submitted build
#[derive(Debug, Clone)]
pub struct Session {
    /// Build identifier handed to the client
    pub id: BuildId,

    /// The manifest, immutable once submitted
    pub request: Arc<BuildRequest>,

    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(request: BuildRequest) -> Self {
        Self {
            id: BuildId::generate(),
            request: Arc::new(request),
            created_at: Utc::now(),
        }
    }
}
