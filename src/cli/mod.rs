//! Command-line interface for keyharvest.
//!
//! Provides commands for running harvest jobs and inspecting the built-in
//! source handlers.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, RunArgs};
