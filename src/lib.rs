//! offbuild - remote builds with a content-addressed source cache
//!
//! The client resolves a package's dependency closure, hashes every source
//! file, and drives a three-phase protocol against the server: `begin`
//! with a manifest, `upload` only the files the server's cache lacks, then
//! `build` to receive the artifact or the toolchain's diagnostics.

pub mod build;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod server;
pub mod session;
pub mod ui;

pub use error::{OffbuildError, OffbuildResult};
