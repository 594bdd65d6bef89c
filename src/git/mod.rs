//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. The engine talks to a
//! repository exclusively through the [`VersionControl`] trait; no other
//! module imports `git2` or runs the `git` executable.
//!
//! # Responsibilities
//!
//! - Repository discovery and branch creation
//! - Worktree attach, remove and prune
//! - Status, staging, committing and pushing inside a workspace
//! - Serializing writes to the shared worktree registry
//!
//! # Invariants
//!
//! - Registry writes (branch, worktree add/remove/prune) hold [`RegistryLock`]
//! - Removing a worktree that is already gone succeeds
//! - All operations return strong types ([`BranchName`](crate::core::types::BranchName))
//!
//! # Example
//!
//! ```no_run
//! use autopkg_prs::git::{GitClient, VersionControl};
//! use autopkg_prs::core::types::BranchName;
//! use std::path::Path;
//!
//! # tokio_test::block_on(async {
//! let base = GitClient::open(Path::new("."))?;
//! let branch = BranchName::new("autopkg/Firefox-20240101120000")?;
//! let ws = Path::new("../worktree-Firefox-20240101120000");
//!
//! base.branch(&branch).await?;
//! base.add_worktree(ws, branch.as_str()).await?;
//! base.scoped_to(ws).push(&branch, "origin", true).await?;
//! base.remove_worktree(ws, true).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

mod interface;
mod lock;
pub mod mock;

pub use interface::{GitClient, GitError, VersionControl};
pub use lock::{lock_path, LockError, RegistryLock};
