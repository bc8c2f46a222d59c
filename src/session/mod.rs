//! Build session management

pub mod id;
pub mod registry;

pub use id::{BuildId, Session, BUILD_ID_HEX_LEN};
pub use registry::{SessionRegistry, DEFAULT_SESSION_TIMEOUT};
