//! CLI command implementations

pub mod build;
pub mod serve;

pub use build::execute as build;
pub use serve::execute as serve;
