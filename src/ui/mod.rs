//! Terminal output for the client
//!
//! Progress bars are drawn on stderr only when it is an interactive
//! terminal; in CI and pipes the client prints plain lines instead.

mod context;
mod progress;

pub use context::UiContext;
pub use progress::UploadProgress;
