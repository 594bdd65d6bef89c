//! cli
//!
//! Command-line interface layer for autopkg-prs.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and initialise logging once
//! - Build the run context and delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Setup failures (unreadable config, missing recipe
//! list, base path not a repository) surface as errors here; once the
//! [`crate::engine`] starts, per-recipe failures are logged and summarised
//! rather than returned.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, RecipeSelection, Shell};

use anyhow::Result;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    commands::dispatch(cli)
}
