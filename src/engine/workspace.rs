//! engine::workspace
//!
//! The isolated workspace guard.
//!
//! # Lifecycle
//!
//! [`WorkspaceGuard::acquire`] creates the attempt branch off the base
//! checkout's HEAD and attaches a worktree for it. The branch HEAD pointed
//! at is recorded as the source branch (`None` when HEAD is detached). The guard hands out a
//! client scoped to that worktree and is the only code that creates or
//! removes worktrees.
//!
//! Teardown prunes stale registrations and then force-removes the worktree.
//! It runs on every exit path:
//!
//! - normally, through [`WorkspaceGuard::release`], which callers await
//!   after the guarded work finishes, fails or is cancelled;
//! - if the guard is dropped without being released (the task was aborted
//!   or panicked), `Drop` performs the same teardown synchronously.
//!
//! A failed attach also triggers teardown, since git may leave a partial
//! directory or registration behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::types::BranchName;
use crate::git::{GitError, VersionControl};

/// Errors creating or removing a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("cannot create branch {branch}: {source}")]
    Branch {
        branch: BranchName,
        #[source]
        source: GitError,
    },

    #[error("cannot attach worktree at {}: {source}", .path.display())]
    Attach {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    #[error("cannot remove worktree at {}: {source}", .path.display())]
    Teardown {
        path: PathBuf,
        #[source]
        source: GitError,
    },
}

impl WorkspaceError {
    /// Whether the branch exists (creation got past the branch step).
    pub fn branch_created(&self) -> bool {
        !matches!(self, WorkspaceError::Branch { .. })
    }
}

/// An attached worktree that is removed when the attempt ends.
#[derive(Debug)]
pub struct WorkspaceGuard {
    base: Arc<dyn VersionControl>,
    client: Arc<dyn VersionControl>,
    path: PathBuf,
    branch: BranchName,
    source_branch: Option<String>,
    released: bool,
}

impl WorkspaceGuard {
    /// Create `branch` and attach a worktree for it at `path`.
    pub async fn acquire(
        base: Arc<dyn VersionControl>,
        path: &Path,
        branch: &BranchName,
    ) -> Result<Self, WorkspaceError> {
        let source_branch = match base.current_branch().await {
            Ok(current) => current,
            Err(e) => {
                tracing::debug!(error = %e, "Cannot read the base branch");
                None
            }
        };

        base.branch(branch)
            .await
            .map_err(|source| WorkspaceError::Branch {
                branch: branch.clone(),
                source,
            })?;

        if let Err(source) = base.add_worktree(path, branch.as_str()).await {
            if let Err(e) = teardown(base.as_ref(), path).await {
                tracing::warn!(path = %path.display(), error = %e, "Cleanup after failed attach");
            }
            return Err(WorkspaceError::Attach {
                path: path.to_path_buf(),
                source,
            });
        }

        tracing::debug!(
            branch = %branch,
            source = source_branch.as_deref().unwrap_or("(detached)"),
            path = %path.display(),
            "Workspace ready"
        );

        Ok(Self {
            client: base.scoped_to(path),
            base,
            path: path.to_path_buf(),
            branch: branch.clone(),
            source_branch,
            released: false,
        })
    }

    /// Client bound to the worktree.
    pub fn client(&self) -> &dyn VersionControl {
        self.client.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn branch(&self) -> &BranchName {
        &self.branch
    }

    /// Branch the base checkout was on when this workspace branched off.
    pub fn source_branch(&self) -> Option<&str> {
        self.source_branch.as_deref()
    }

    /// Prune, then force-remove the worktree.
    pub async fn release(mut self) -> Result<(), WorkspaceError> {
        let result = teardown(self.base.as_ref(), &self.path).await;
        self.released = true;
        tracing::debug!(path = %self.path.display(), "Workspace released");
        result
    }
}

/// Prune then remove; both run even if pruning fails.
async fn teardown(base: &dyn VersionControl, path: &Path) -> Result<(), WorkspaceError> {
    let pruned = base.prune_worktrees().await;
    let removed = base.remove_worktree(path, true).await;
    pruned.and(removed).map_err(|source| WorkspaceError::Teardown {
        path: path.to_path_buf(),
        source,
    })
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(path = %self.path.display(), "Workspace dropped without release; removing");
        if let Err(e) = self.base.teardown_blocking(&self.path) {
            tracing::error!(path = %self.path.display(), error = %e, "Workspace removal failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::mock::{MockVcs, VcsOp};
    use tempfile::TempDir;

    fn setup() -> (TempDir, MockVcs, PathBuf, BranchName) {
        let temp = TempDir::new().unwrap();
        let vcs = MockVcs::new(temp.path().join("repo"));
        let path = temp.path().join("worktree-Foo-20240101000000");
        let branch = BranchName::new("autopkg/Foo-20240101000000").unwrap();
        (temp, vcs, path, branch)
    }

    #[tokio::test]
    async fn acquire_then_release() {
        let (_temp, vcs, path, branch) = setup();
        let guard = WorkspaceGuard::acquire(Arc::new(vcs.clone()), &path, &branch)
            .await
            .unwrap();

        assert!(path.is_dir());
        assert_eq!(guard.client().path(), path);
        assert!(vcs.has_branch(branch.as_str()));
        assert_eq!(guard.source_branch(), Some("main"));

        guard.release().await.unwrap();
        assert!(!path.exists());
        assert!(vcs.live_worktrees().is_empty());

        let ops: Vec<_> = vcs.calls().into_iter().map(|c| c.op).collect();
        assert_eq!(
            ops,
            vec![VcsOp::Branch, VcsOp::AddWorktree, VcsOp::Prune, VcsOp::RemoveWorktree]
        );
    }

    #[tokio::test]
    async fn branch_failure_creates_nothing() {
        let (_temp, vcs, path, branch) = setup();
        let vcs = vcs.fail_on(VcsOp::Branch, None);

        let err = WorkspaceGuard::acquire(Arc::new(vcs.clone()), &path, &branch)
            .await
            .unwrap_err();
        assert!(!err.branch_created());
        assert!(vcs.calls_of(VcsOp::AddWorktree).is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn attach_failure_cleans_up() {
        let (_temp, vcs, path, branch) = setup();
        let vcs = vcs.fail_on(VcsOp::AddWorktree, None);

        let err = WorkspaceGuard::acquire(Arc::new(vcs.clone()), &path, &branch)
            .await
            .unwrap_err();
        assert!(err.branch_created());
        assert_eq!(vcs.calls_of(VcsOp::RemoveWorktree).len(), 1);
    }

    #[tokio::test]
    async fn drop_without_release_tears_down() {
        let (_temp, vcs, path, branch) = setup();
        let guard = WorkspaceGuard::acquire(Arc::new(vcs.clone()), &path, &branch)
            .await
            .unwrap();
        drop(guard);

        assert!(!path.exists());
        assert!(vcs.live_worktrees().is_empty());
    }

    #[tokio::test]
    async fn aborted_task_tears_down() {
        let (_temp, vcs, path, branch) = setup();
        let base: Arc<dyn VersionControl> = Arc::new(vcs.clone());
        let p = path.clone();
        let task = tokio::spawn(async move {
            let _guard = WorkspaceGuard::acquire(base, &p, &branch).await.unwrap();
            std::future::pending::<()>().await;
        });

        while vcs.live_worktrees().is_empty() {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        assert!(!path.exists());
        assert!(vcs.live_worktrees().is_empty());
    }

    #[tokio::test]
    async fn teardown_error_is_reported_once() {
        let (_temp, vcs, path, branch) = setup();
        let vcs = vcs.fail_on(VcsOp::RemoveWorktree, None);
        let guard = WorkspaceGuard::acquire(Arc::new(vcs.clone()), &path, &branch)
            .await
            .unwrap();

        let err = guard.release().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Teardown { .. }));
        // Drop does not retry after an explicit release
        assert_eq!(vcs.calls_of(VcsOp::RemoveWorktree).len(), 1);
    }
}
