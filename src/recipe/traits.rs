//! recipe::traits
//!
//! Collaborator contracts for locating and running recipes.
//!
//! # Design
//!
//! Both traits are async: finding a recipe walks the filesystem and running
//! one spawns the recipe engine, and neither may block the runtime thread.
//! The engine only sees these traits, so tests swap in the recording mocks
//! from [`mock`](super::mock).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{RecipeName, RunStamp, TypeError};
use crate::process::ProcessError;

/// Errors from finding or running a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
    /// No recipe file matches the logical name.
    #[error("recipe not found: {name}")]
    NotFound {
        /// The logical name that was looked up
        name: String,
    },

    /// The recipe file name does not yield a usable identifier.
    #[error("invalid recipe name: {0}")]
    InvalidName(#[from] TypeError),

    /// The recipe ran and reported failures.
    #[error("recipe {recipe} failed: {}", .messages.join("; "))]
    Failed {
        /// The recipe identifier
        recipe: String,
        /// Failure messages from the engine
        messages: Vec<String>,
    },

    /// The recipe engine could not be started.
    #[error("recipe engine: {0}")]
    Execution(#[from] ProcessError),

    /// The run report exists but could not be read.
    #[error("unreadable report {path}: {message}")]
    Report {
        /// Report location
        path: PathBuf,
        /// Parse or I/O error
        message: String,
    },

    /// Internal runtime error (e.g. a blocking task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

/// One package the recipe added to the content repository.
///
/// Paths are relative to the munki repository root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedItem {
    pub name: String,
    pub version: String,
    /// Icon (content) path, e.g. `icons/Firefox.png`
    pub icon_path: Option<PathBuf>,
    /// Package-info (metadata) path, e.g. `pkgsinfo/apps/Firefox-1.0.plist`
    pub pkginfo_path: Option<PathBuf>,
    /// Package payload path, e.g. `pkgs/apps/Firefox-1.0.dmg`
    pub pkg_path: Option<PathBuf>,
}

impl ImportedItem {
    /// The content and metadata paths that describe this import.
    pub fn changed_paths(&self) -> impl Iterator<Item = &Path> {
        self.icon_path
            .as_deref()
            .into_iter()
            .chain(self.pkginfo_path.as_deref())
    }
}

/// What a recipe run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeResult {
    /// Imported items, or `None` when the engine produced no report.
    pub imported: Option<Vec<ImportedItem>>,
    /// The report file, if one was written.
    pub report: Option<PathBuf>,
}

impl RecipeResult {
    /// A result listing `items`.
    pub fn with_items(items: Vec<ImportedItem>) -> Self {
        Self {
            imported: Some(items),
            report: None,
        }
    }

    /// A result with no report to inspect.
    pub fn unreported() -> Self {
        Self::default()
    }
}

/// Everything the runner needs for one attempt.
#[derive(Debug, Clone)]
pub struct RecipeRequest {
    pub name: RecipeName,
    /// Resolved recipe file
    pub path: PathBuf,
    /// The attempt's isolated workspace
    pub workspace: PathBuf,
    pub stamp: RunStamp,
}

/// Resolves logical recipe names to recipe files.
#[async_trait]
pub trait RecipeFinder: Send + Sync {
    /// Find the recipe file for `name`.
    async fn find_recipe(&self, name: &str) -> Result<PathBuf, RecipeError>;
}

/// Runs one recipe inside a workspace.
#[async_trait]
pub trait RecipeRunner: Send + Sync {
    async fn run(&self, request: &RecipeRequest) -> Result<RecipeResult, RecipeError>;
}
