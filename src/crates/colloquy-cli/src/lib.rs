//! # colloquy-cli
//!
//! Drives classroom threads from the command line. Each invocation loads the
//! layered configuration, builds the workflow over the configured checkpoint
//! store and runs one command, so a thread started by `colloquy run` can be
//! continued by a later `colloquy resume` when the file backend is used.

pub mod cli;
pub mod commands;
pub mod logging;

pub use cli::{Cli, Commands, GraphFormat};
