//! Content-addressed source cache
//!
//! Source files are stored keyed by the SHA-256 hash of their bytes.
//! Entries are immutable once published and are never deleted by offbuild.
//!
//! # Layout
//!
//! | Path | Description |
//! |------|-------------|
//! | `<root>/<hh>/<rest>` | Published entry; `hh` = first two hex chars of the hash |
//! | `<root>/.upload-*` | In-flight upload, renamed into place once verified |

pub mod hash;
pub mod store;

pub use hash::{hash_file, ContentHash, ContentHasher, HASH_HEX_LEN};
pub use store::ContentCache;
