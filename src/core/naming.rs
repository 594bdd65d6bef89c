//! core::naming
//!
//! Branch and workspace naming for recipe attempts.
//!
//! # Layout
//!
//! For a recipe `Foo` started at 2024-01-02 03:04:05 UTC, with the base
//! checkout at `/ci/repo`:
//!
//! - branch: `autopkg/Foo-20240102030405`
//! - workspace: `/ci/worktree-Foo-20240102030405`
//!
//! # Invariants
//!
//! - Both names embed the recipe name and the same stamp, so two attempts
//!   with distinct recipes or distinct stamps never collide.
//! - The workspace is a sibling of the base checkout, never inside it, so
//!   nothing an attempt writes shows up in the base working tree's status.

use std::path::{Path, PathBuf};

use super::types::{BranchName, RecipeName, RunStamp, TypeError};

/// Default branch namespace.
pub const DEFAULT_BRANCH_NAMESPACE: &str = "autopkg";

/// Default prefix for workspace directory names.
pub const DEFAULT_WORKTREE_PREFIX: &str = "worktree";

/// Names owned by a single recipe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptNames {
    /// Branch the workspace is checked out to.
    pub branch: BranchName,
    /// Directory the workspace is attached at.
    pub workspace: PathBuf,
}

/// Derives attempt names from configuration.
///
/// # Example
///
/// ```
/// use autopkg_prs::core::naming::Naming;
/// use autopkg_prs::core::types::{RecipeName, RunStamp};
/// use chrono::{TimeZone, Utc};
/// use std::path::Path;
///
/// let naming = Naming::default();
/// let recipe = RecipeName::new("Foo").unwrap();
/// let stamp = RunStamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
///
/// let names = naming.attempt(&recipe, &stamp, Path::new("/ci/repo")).unwrap();
/// assert_eq!(names.branch.as_str(), "autopkg/Foo-20240102030405");
/// assert_eq!(names.workspace, Path::new("/ci/worktree-Foo-20240102030405"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    namespace: String,
    worktree_prefix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_BRANCH_NAMESPACE.to_string(),
            worktree_prefix: DEFAULT_WORKTREE_PREFIX.to_string(),
        }
    }
}

impl Naming {
    /// Create a naming scheme with a custom branch namespace and worktree prefix.
    pub fn new(namespace: impl Into<String>, worktree_prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            worktree_prefix: worktree_prefix.into(),
        }
    }

    /// The branch namespace (first path component of every branch).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Compute the branch name for an attempt.
    ///
    /// # Errors
    ///
    /// Fails if the configured namespace makes the result an invalid branch name.
    pub fn branch(&self, recipe: &RecipeName, stamp: &RunStamp) -> Result<BranchName, TypeError> {
        let namespace = self.namespace.trim_matches('/');
        if namespace.is_empty() {
            BranchName::new(format!("{}-{}", recipe, stamp.compact()))
        } else {
            BranchName::new(format!("{}/{}-{}", namespace, recipe, stamp.compact()))
        }
    }

    /// Compute the workspace path for an attempt.
    ///
    /// The path is a sibling of `repo_root`. A root with no parent (e.g. `/`
    /// or a bare relative name) falls back to the current directory's parent
    /// semantics by joining onto `..`.
    pub fn workspace(&self, recipe: &RecipeName, stamp: &RunStamp, repo_root: &Path) -> PathBuf {
        let dir_name = format!("{}-{}-{}", self.worktree_prefix, recipe, stamp.compact());
        match repo_root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(dir_name),
            _ => repo_root.join("..").join(dir_name),
        }
    }

    /// Compute both names for an attempt.
    pub fn attempt(
        &self,
        recipe: &RecipeName,
        stamp: &RunStamp,
        repo_root: &Path,
    ) -> Result<AttemptNames, TypeError> {
        Ok(AttemptNames {
            branch: self.branch(recipe, stamp)?,
            workspace: self.workspace(recipe, stamp, repo_root),
        })
    }
}
