//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! `run` and `resolve` share [`Session::open`], which does every fallible
//! setup step in order:
//! 1. Locate the base checkout
//! 2. Load and resolve configuration, applying flag overrides
//! 3. Initialise logging
//! 4. Read the recipe selection
//! 5. Build the [`RunContext`]
//!
//! The handlers then drive the engine on a tokio runtime.

mod completion;
mod resolve;
mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::args::{Cli, Command, RecipeSelection};
use crate::core::config::{Config, Settings};
use crate::core::recipe_list;
use crate::engine::RunContext;
use crate::forge::GhCli;
use crate::git::{GitClient, VersionControl};
use crate::recipe::{AutopkgRunner, DirRecipeFinder};
use crate::ui::output::{self, Verbosity};

/// Dispatch a parsed command line to its handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Completion { shell } => completion::completion(*shell),
        Command::Run { selection } => run::run(Session::open(&cli, selection)?),
        Command::Resolve { selection } => resolve::resolve(Session::open(&cli, selection)?),
    }
}

/// Everything a command needs once setup has succeeded.
#[derive(Debug)]
pub(crate) struct Session {
    pub ctx: Arc<RunContext>,
    /// Recipe list entries, in order
    pub sources: Vec<String>,
}

impl Session {
    fn open(cli: &Cli, selection: &RecipeSelection) -> Result<Self> {
        let start = match &cli.repo {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("cannot determine the current directory")?,
        };
        let base = GitClient::open(&start)
            .with_context(|| format!("{} is not a usable git checkout", start.display()))?;
        let repo_root = base.path().to_path_buf();

        let loaded = Config::load(cli.config.as_deref(), &repo_root)
            .context("failed to load configuration")?;
        let mut settings = loaded.config.resolve(&repo_root);

        let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose, settings.verbosity);
        settings.verbosity = verbosity.engine_level();
        if let Some(list) = &selection.recipe_list {
            settings.recipe_list = absolute(list)?;
        }

        output::init_logging(verbosity, settings.log_file.as_deref())
            .context("failed to initialise logging")?;

        for warning in &loaded.warnings {
            tracing::warn!(path = %warning.path.display(), "{}", warning.message);
        }
        match loaded.config.loaded_from() {
            Some(path) => tracing::debug!(path = %path.display(), "Loaded configuration"),
            None => tracing::debug!("No configuration file; using defaults"),
        }

        let sources = if selection.recipes.is_empty() {
            recipe_list::load(&settings.recipe_list).context("cannot read the recipe list")?
        } else {
            selection.recipes.clone()
        };

        let ctx = build_context(base, settings);
        Ok(Self {
            ctx: Arc::new(ctx),
            sources,
        })
    }
}

/// Wire the production collaborators.
fn build_context(base: GitClient, settings: Settings) -> RunContext {
    let vcs = Arc::new(base.with_binary(settings.git.binary.clone()));
    let finder = Arc::new(DirRecipeFinder::from_settings(&settings));
    let runner = Arc::new(AutopkgRunner::from_settings(&settings));

    let publisher = settings
        .pull_request
        .enabled
        .then(|| Arc::new(GhCli::from_settings(&settings.pull_request)));

    let ctx = RunContext::new(settings, vcs, finder, runner);
    match publisher {
        Some(gh) => ctx.with_publisher(gh),
        None => ctx,
    }
}

fn absolute(path: &std::path::Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("cannot determine the current directory")?
        .join(path))
}

/// Runtime for the engine.
///
/// Attempts interleave on one thread; git registry work and filesystem
/// walks go to the blocking pool.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}
