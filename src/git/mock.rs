//! git::mock
//!
//! In-memory [`VersionControl`] for deterministic engine tests.
//!
//! # Design
//!
//! The mock keeps just enough state to behave like a repository with
//! linked worktrees: known branches, live workspaces and, per workspace,
//! which files have been committed. Workspaces are real directories so a
//! fake recipe runner can write into them; `status` reports every file in
//! the workspace that has not been committed yet.
//!
//! Every call is recorded, and any operation can be made to fail, either
//! everywhere or only where the path or branch contains a given substring.
//!
//! # Example
//!
//! ```
//! use autopkg_prs::git::mock::{MockVcs, VcsOp};
//! use autopkg_prs::git::VersionControl;
//! use autopkg_prs::core::types::BranchName;
//!
//! # tokio_test::block_on(async {
//! let temp = tempfile::TempDir::new().unwrap();
//! let vcs = MockVcs::new(temp.path().join("repo")).fail_on(VcsOp::Push, Some("Bar"));
//!
//! let branch = BranchName::new("autopkg/Bar-20240101000000").unwrap();
//! vcs.branch(&branch).await.unwrap();
//! assert!(vcs.push(&branch, "origin", true).await.is_err());
//! # });
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::interface::{GitError, VersionControl};
use crate::core::types::BranchName;

/// Operations the mock can record and fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsOp {
    Branch,
    AddWorktree,
    RemoveWorktree,
    Prune,
    Status,
    Add,
    Commit,
    Push,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsCall {
    /// Which operation
    pub op: VcsOp,
    /// Location of the client that made the call
    pub path: PathBuf,
    /// Operation argument (branch, worktree path, message, ...)
    pub detail: String,
}

#[derive(Debug, Clone)]
struct Failure {
    op: VcsOp,
    matching: Option<String>,
}

#[derive(Debug, Default)]
struct MockVcsInner {
    branches: HashSet<String>,
    /// Live workspaces and the branch checked out in each.
    worktrees: HashMap<PathBuf, String>,
    /// Committed files (workspace-relative) per workspace.
    committed: HashMap<PathBuf, HashSet<PathBuf>>,
    staged: HashMap<PathBuf, HashSet<PathBuf>>,
    failures: Vec<Failure>,
    calls: Vec<VcsCall>,
}

/// Recording mock repository.
///
/// Clones (and clients from [`scoped_to`](VersionControl::scoped_to))
/// share state.
#[derive(Debug, Clone)]
pub struct MockVcs {
    path: PathBuf,
    inner: Arc<Mutex<MockVcsInner>>,
}

impl MockVcs {
    /// A mock repository rooted at `root` with `main` checked out.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut inner = MockVcsInner::default();
        inner.branches.insert("main".to_string());
        Self {
            path: root.into(),
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Fail `op`, optionally only where the path or argument contains `matching`.
    pub fn fail_on(self, op: VcsOp, matching: Option<&str>) -> Self {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).failures.push(Failure {
            op,
            matching: matching.map(str::to_string),
        });
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<VcsCall> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).calls.clone()
    }

    /// Calls of one kind.
    pub fn calls_of(&self, op: VcsOp) -> Vec<VcsCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Workspaces currently attached.
    pub fn live_worktrees(&self) -> Vec<PathBuf> {
        let mut v: Vec<_> = self.inner.lock().unwrap_or_else(PoisonError::into_inner).worktrees.keys().cloned().collect();
        v.sort();
        v
    }

    /// Whether `name` exists.
    pub fn has_branch(&self, name: &str) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).branches.contains(name)
    }

    fn record(&self, op: VcsOp, detail: impl Into<String>) -> Result<(), GitError> {
        let detail = detail.into();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.calls.push(VcsCall {
            op,
            path: self.path.clone(),
            detail: detail.clone(),
        });

        let path = self.path.to_string_lossy();
        let failed = inner.failures.iter().any(|f| {
            f.op == op
                && f.matching
                    .as_deref()
                    .map_or(true, |m| path.contains(m) || detail.contains(m))
        });
        if failed {
            return Err(GitError::CommandFailed {
                operation: format!("{:?}", op).to_lowercase(),
                message: format!("injected failure at {}", self.path.display()),
            });
        }
        Ok(())
    }

    fn detach(&self, path: &Path) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.worktrees.remove(path);
        inner.committed.remove(path);
        inner.staged.remove(path);
        drop(inner);
        let _ = fs::remove_dir_all(path);
    }

    fn pending_files(&self) -> Vec<PathBuf> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let committed = inner.committed.get(&self.path);
        WalkDir::new(&self.path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(&self.path).ok().map(Path::to_path_buf))
            .filter(|rel| committed.map_or(true, |c| !c.contains(rel)))
            .collect()
    }
}

#[async_trait]
impl VersionControl for MockVcs {
    fn path(&self) -> &Path {
        &self.path
    }

    fn scoped_to(&self, path: &Path) -> Arc<dyn VersionControl> {
        Arc::new(Self {
            path: path.to_path_buf(),
            inner: Arc::clone(&self.inner),
        })
    }

    async fn current_branch(&self) -> Result<Option<String>, GitError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Some(
            inner
                .worktrees
                .get(&self.path)
                .cloned()
                .unwrap_or_else(|| "main".to_string()),
        ))
    }

    async fn branch(&self, name: &BranchName) -> Result<(), GitError> {
        self.record(VcsOp::Branch, name.as_str())?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.branches.insert(name.to_string()) {
            return Err(GitError::BranchExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn add_worktree(&self, path: &Path, branch_or_commit: &str) -> Result<(), GitError> {
        self.record(VcsOp::AddWorktree, path.to_string_lossy())?;
        {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.worktrees.contains_key(path) || path.exists() {
                return Err(GitError::CommandFailed {
                    operation: "worktree add".to_string(),
                    message: format!("'{}' already exists", path.display()),
                });
            }
        }
        fs::create_dir_all(path).map_err(|e| GitError::CommandFailed {
            operation: "worktree add".to_string(),
            message: e.to_string(),
        })?;
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .worktrees
            .insert(path.to_path_buf(), branch_or_commit.to_string());
        Ok(())
    }

    async fn remove_worktree(&self, path: &Path, _force: bool) -> Result<(), GitError> {
        self.record(VcsOp::RemoveWorktree, path.to_string_lossy())?;
        self.detach(path);
        Ok(())
    }

    async fn prune_worktrees(&self) -> Result<(), GitError> {
        self.record(VcsOp::Prune, "")?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.worktrees.retain(|p, _| p.exists());
        Ok(())
    }

    async fn status(&self, porcelain: bool) -> Result<String, GitError> {
        self.record(VcsOp::Status, if porcelain { "--porcelain" } else { "" })?;
        Ok(self
            .pending_files()
            .iter()
            .map(|p| format!("?? {}\n", p.display()))
            .collect())
    }

    async fn add(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        let detail = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.record(VcsOp::Add, detail)?;

        let pending = self.pending_files();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let staged = inner.staged.entry(self.path.clone()).or_default();
        for p in paths {
            let rel = p.strip_prefix(&self.path).unwrap_or(p);
            let everything = rel.as_os_str().is_empty() || rel == Path::new(".");
            staged.extend(
                pending
                    .iter()
                    .filter(|f| everything || f.starts_with(rel))
                    .cloned(),
            );
        }
        Ok(())
    }

    async fn commit(&self, message: &str, all_changes: bool) -> Result<(), GitError> {
        self.record(VcsOp::Commit, message)?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let staged = inner.staged.remove(&self.path).unwrap_or_default();
        if staged.is_empty() && !all_changes {
            return Err(GitError::CommandFailed {
                operation: "commit".to_string(),
                message: "nothing added to commit".to_string(),
            });
        }
        inner
            .committed
            .entry(self.path.clone())
            .or_default()
            .extend(staged);
        Ok(())
    }

    async fn push(
        &self,
        branch: &BranchName,
        remote: &str,
        _set_upstream: bool,
    ) -> Result<(), GitError> {
        self.record(VcsOp::Push, format!("{} {}", remote, branch))?;
        Ok(())
    }

    fn teardown_blocking(&self, path: &Path) -> Result<(), GitError> {
        self.record(VcsOp::Prune, "")?;
        self.record(VcsOp::RemoveWorktree, path.to_string_lossy())?;
        self.detach(path);
        Ok(())
    }
}
