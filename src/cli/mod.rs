//! Command-line interface for sessionforge.
//!
//! Provides the batch migration entry point and a single-session mode for
//! debugging one migration in the foreground.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
