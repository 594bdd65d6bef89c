//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--repo <path>`: Base checkout to branch from (default: current directory)
//! - `--config <path>`: Configuration file
//! - `-v` / `--verbose`: Repeat for more detail
//! - `--quiet` / `-q`: Warnings and errors only

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// autopkg-prs - Run AutoPkg recipes and open one pull request per update
#[derive(Parser, Debug)]
#[command(name = "autopkg-prs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base repository checkout (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Configuration file (overrides the default search locations)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Which recipes a command operates on.
#[derive(Args, Debug, Clone, Default)]
pub struct RecipeSelection {
    /// Recipe to process; repeat for several (replaces the recipe list)
    #[arg(long = "recipe", value_name = "NAME")]
    pub recipes: Vec<String>,

    /// JSON recipe list (overrides the configured `recipe_list`)
    #[arg(long, value_name = "PATH")]
    pub recipe_list: Option<PathBuf>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every recipe in its own branch and worktree
    #[command(
        long_about = "Run every recipe in its own branch and worktree.\n\n\
            Each recipe gets a fresh branch off the current branch and an isolated \
            worktree. When the recipe imports something the change is committed, \
            pushed, and a pull request is opened. The worktree is removed afterwards \
            whatever the outcome.\n\n\
            Failures of individual recipes are logged and never stop the others.",
        after_help = "EXAMPLES:\n    \
            autopkg-prs run\n    \
            autopkg-prs run --recipe Firefox.munki --recipe GoogleChrome.munki\n    \
            autopkg-prs run --recipe-list AutoPkg/nightly.json -v"
    )]
    Run {
        #[command(flatten)]
        selection: RecipeSelection,
    },

    /// Resolve recipe names to files without running anything
    #[command(
        long_about = "Resolve recipe names to files without running anything.\n\n\
            Prints one line per list entry: the recipe name and the file it resolves \
            to, or the reason it does not resolve. No branch or worktree is created.",
        after_help = "EXAMPLES:\n    \
            autopkg-prs resolve\n    \
            autopkg-prs resolve --recipe Firefox"
    )]
    Resolve {
        #[command(flatten)]
        selection: RecipeSelection,
    },

    /// Generate shell completion scripts
    #[command(after_help = "EXAMPLES:\n    \
            autopkg-prs completion bash > /etc/bash_completion.d/autopkg-prs\n    \
            autopkg-prs completion zsh > ~/.zfunc/_autopkg-prs")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
