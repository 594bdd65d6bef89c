//! git::interface
//!
//! The version control contract and its git implementation.
//!
//! # Architecture
//!
//! [`VersionControl`] is the only way the engine touches a repository. A
//! client is bound to one filesystem location at construction; a client
//! for a workspace is derived from the base client with
//! [`VersionControl::scoped_to`], and shares the base client's registry
//! lock.
//!
//! [`GitClient`] splits the work the way the operations need it:
//! - Repository discovery and branch creation use `git2`.
//! - Worktree attach/remove/prune and the porcelain commands (status, add,
//!   commit, push) shell out to the `git` CLI, which handles hooks,
//!   credentials and worktree bookkeeping exactly like a user's git.
//! - Registry-mutating calls (branch, worktree add/remove/prune) run on the
//!   blocking pool while holding the [`RegistryLock`]. Everything else runs
//!   as an async subprocess and stays fully concurrent.
//!
//! # Error Handling
//!
//! - [`GitError::NotARepo`]: the base path is not inside a repository
//! - [`GitError::BranchExists`]: the attempt branch already exists
//! - [`GitError::CommandFailed`]: a git subprocess failed (carries stderr)
//! - [`GitError::Lock`]: the registry lock could not be taken

use std::ffi::{OsStr, OsString};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::lock::{LockError, RegistryLock};
use crate::core::types::BranchName;
use crate::process::{Invocation, ProcessError};

/// Errors from version control operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// HEAD does not resolve to a commit (e.g. an empty repository).
    #[error("HEAD does not point at a commit: {message}")]
    NoHeadCommit {
        /// Underlying error message
        message: String,
    },

    /// The branch to create already exists.
    #[error("branch already exists: {name}")]
    BranchExists {
        /// The branch name
        name: String,
    },

    /// A git subprocess failed.
    #[error("git {operation} failed: {message}")]
    CommandFailed {
        /// The git subcommand
        operation: String,
        /// stderr (or the spawn error)
        message: String,
    },

    /// The worktree registry lock could not be taken.
    #[error("registry lock: {0}")]
    Lock(#[from] LockError),

    /// Internal git2 or runtime error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    fn command(operation: &str, err: ProcessError) -> Self {
        let message = match err {
            ProcessError::Failed { stderr, stdout, .. } => {
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.to_string()
                }
            }
            other => other.to_string(),
        };
        GitError::CommandFailed {
            operation: operation.to_string(),
            message,
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

/// Version control primitives the engine invokes.
///
/// Every async method is a suspension point. Implementations must be
/// `Send + Sync` so attempts can run as separate tasks.
#[async_trait]
pub trait VersionControl: Send + Sync + Debug {
    /// The location this client is bound to.
    fn path(&self) -> &Path;

    /// A client for another checkout of the same repository (a workspace).
    fn scoped_to(&self, path: &Path) -> Arc<dyn VersionControl>;

    /// The branch currently checked out at [`path`](Self::path), if any.
    async fn current_branch(&self) -> Result<Option<String>, GitError>;

    /// Create `name` at the current HEAD without checking it out.
    async fn branch(&self, name: &BranchName) -> Result<(), GitError>;

    /// Attach a new worktree at `path` checked out to `branch_or_commit`.
    async fn add_worktree(&self, path: &Path, branch_or_commit: &str) -> Result<(), GitError>;

    /// Remove the worktree at `path`. A path that no longer exists is not an error.
    async fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError>;

    /// Drop registrations of worktrees whose directories are gone.
    async fn prune_worktrees(&self) -> Result<(), GitError>;

    /// Working tree status; `porcelain` selects the machine-readable form.
    async fn status(&self, porcelain: bool) -> Result<String, GitError>;

    /// Stage `paths` (relative to [`path`](Self::path)).
    async fn add(&self, paths: &[PathBuf]) -> Result<(), GitError>;

    /// Commit the index; `all_changes` also stages modified tracked files.
    async fn commit(&self, message: &str, all_changes: bool) -> Result<(), GitError>;

    /// Push `branch` to `remote`, optionally recording it as upstream.
    async fn push(&self, branch: &BranchName, remote: &str, set_upstream: bool)
        -> Result<(), GitError>;

    /// Prune and force-remove the worktree at `path` without an async runtime.
    ///
    /// Used when the async teardown could not run (the attempt was aborted).
    fn teardown_blocking(&self, path: &Path) -> Result<(), GitError>;
}

/// The git implementation of [`VersionControl`].
///
/// # Example
///
/// ```no_run
/// use autopkg_prs::git::{GitClient, VersionControl};
/// use std::path::Path;
///
/// # tokio_test::block_on(async {
/// let base = GitClient::open(Path::new("."))?;
/// let status = base.status(true).await?;
/// println!("dirty: {}", !status.trim().is_empty());
/// # Ok::<(), autopkg_prs::git::GitError>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct GitClient {
    /// Checkout this client operates in
    path: PathBuf,
    /// Shared git directory (holds the registry lock)
    common_dir: PathBuf,
    /// git executable
    binary: PathBuf,
}

impl GitClient {
    /// Open the repository containing `path`.
    ///
    /// The client is bound to the repository's working directory root, not
    /// to `path` itself, so sibling workspace paths are computed from the root.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        let work_dir = repo.workdir().ok_or(GitError::BareRepo)?;

        Ok(Self {
            path: strip_trailing_separator(work_dir),
            common_dir: repo.commondir().to_path_buf(),
            binary: PathBuf::from("git"),
        })
    }

    /// Use a specific git executable for subprocess operations.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn git(&self) -> Invocation {
        Invocation::new(&self.binary)
            .arg("-C")
            .arg(&self.path)
            .env("GIT_TERMINAL_PROMPT", "0")
    }

    /// Run `f` on the blocking pool while holding the registry lock.
    async fn with_registry<T, F>(&self, operation: &'static str, f: F) -> Result<T, GitError>
    where
        F: FnOnce() -> Result<T, GitError> + Send + 'static,
        T: Send + 'static,
    {
        let common_dir = self.common_dir.clone();
        tokio::task::spawn_blocking(move || {
            let _lock = RegistryLock::acquire(&common_dir)?;
            f()
        })
        .await
        .map_err(|e| GitError::Internal {
            message: format!("{} task failed: {}", operation, e),
        })?
    }
}

fn strip_trailing_separator(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Synchronous git invocation for use on the blocking pool.
fn run_git_blocking<I, S>(binary: &Path, dir: &Path, operation: &str, args: I) -> Result<(), GitError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = std::process::Command::new(binary)
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(std::process::Stdio::null())
        .output()
        .map_err(|e| GitError::CommandFailed {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(GitError::CommandFailed {
            operation: operation.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn prune_blocking(binary: &Path, repo: &Path) -> Result<(), GitError> {
    run_git_blocking(binary, repo, "worktree prune", ["worktree", "prune"])
}

fn remove_blocking(binary: &Path, repo: &Path, path: &Path, force: bool) -> Result<(), GitError> {
    let mut args: Vec<OsString> = vec!["worktree".into(), "remove".into()];
    if force {
        args.push("--force".into());
    }
    args.push(path.as_os_str().to_os_string());

    match run_git_blocking(binary, repo, "worktree remove", &args) {
        Ok(()) => Ok(()),
        // Already gone (earlier teardown or by hand): prune drops the registration
        Err(_) if !path.exists() => prune_blocking(binary, repo),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl VersionControl for GitClient {
    fn path(&self) -> &Path {
        &self.path
    }

    fn scoped_to(&self, path: &Path) -> Arc<dyn VersionControl> {
        Arc::new(Self {
            path: path.to_path_buf(),
            common_dir: self.common_dir.clone(),
            binary: self.binary.clone(),
        })
    }

    async fn current_branch(&self) -> Result<Option<String>, GitError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = git2::Repository::open(&path).map_err(|_| GitError::NotARepo {
                path: path.clone(),
            })?;
            let head = match repo.head() {
                Ok(h) => h,
                Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if head.is_branch() {
                Ok(head.shorthand().map(str::to_string))
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(|e| GitError::Internal {
            message: format!("current branch task failed: {}", e),
        })?
    }

    async fn branch(&self, name: &BranchName) -> Result<(), GitError> {
        let path = self.path.clone();
        let name = name.clone();
        self.with_registry("branch", move || {
            let repo = git2::Repository::open(&path).map_err(|_| GitError::NotARepo {
                path: path.clone(),
            })?;
            let head = repo
                .head()
                .and_then(|h| h.peel_to_commit())
                .map_err(|e| GitError::NoHeadCommit {
                    message: e.message().to_string(),
                })?;

            let created = match repo.branch(name.as_str(), &head, false) {
                Ok(_) => Ok(()),
                Err(e) if e.code() == git2::ErrorCode::Exists => Err(GitError::BranchExists {
                    name: name.to_string(),
                }),
                Err(e) => Err(e.into()),
            };
            created
        })
        .await
    }

    async fn add_worktree(&self, path: &Path, branch_or_commit: &str) -> Result<(), GitError> {
        let binary = self.binary.clone();
        let repo = self.path.clone();
        let target = path.to_path_buf();
        let rev = branch_or_commit.to_string();
        self.with_registry("worktree add", move || {
            let args: [&OsStr; 4] = ["worktree".as_ref(), "add".as_ref(), target.as_os_str(), rev.as_ref()];
            run_git_blocking(&binary, &repo, "worktree add", args)
        })
        .await
    }

    async fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError> {
        let binary = self.binary.clone();
        let repo = self.path.clone();
        let target = path.to_path_buf();
        self.with_registry("worktree remove", move || {
            remove_blocking(&binary, &repo, &target, force)
        })
        .await
    }

    async fn prune_worktrees(&self) -> Result<(), GitError> {
        let binary = self.binary.clone();
        let repo = self.path.clone();
        self.with_registry("worktree prune", move || prune_blocking(&binary, &repo))
            .await
    }

    async fn status(&self, porcelain: bool) -> Result<String, GitError> {
        let mut cmd = self.git().arg("status");
        if porcelain {
            cmd = cmd.arg("--porcelain");
        }
        let out = cmd
            .run_checked()
            .await
            .map_err(|e| GitError::command("status", e))?;
        Ok(out.stdout)
    }

    async fn add(&self, paths: &[PathBuf]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.git()
            .args(["add", "--"])
            .args(paths)
            .run_checked()
            .await
            .map_err(|e| GitError::command("add", e))?;
        Ok(())
    }

    async fn commit(&self, message: &str, all_changes: bool) -> Result<(), GitError> {
        let mut cmd = self.git().args(["commit", "-m", message]);
        if all_changes {
            cmd = cmd.arg("--all");
        }
        cmd.run_checked()
            .await
            .map_err(|e| GitError::command("commit", e))?;
        Ok(())
    }

    async fn push(
        &self,
        branch: &BranchName,
        remote: &str,
        set_upstream: bool,
    ) -> Result<(), GitError> {
        let mut cmd = self.git().arg("push");
        if set_upstream {
            cmd = cmd.arg("--set-upstream");
        }
        cmd.args([remote, branch.as_str()])
            .run_checked()
            .await
            .map_err(|e| GitError::command("push", e))?;
        Ok(())
    }

    fn teardown_blocking(&self, path: &Path) -> Result<(), GitError> {
        let _lock = RegistryLock::acquire(&self.common_dir)?;
        prune_blocking(&self.binary, &self.path)?;
        remove_blocking(&self.binary, &self.path, path, true)
    }
}
