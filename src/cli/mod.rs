//! Command-line interfaces of the client and the server

pub mod args;
pub mod commands;

pub use args::{ClientCli, LogFormat, ServerCli};
