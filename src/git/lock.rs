//! git::lock
//!
//! Exclusive lock over the repository's branch and worktree registry.
//!
//! # Architecture
//!
//! Creating a branch, attaching a worktree, removing a worktree and pruning
//! stale registrations all write shared files under the common git
//! directory (`refs/`, `worktrees/`, `config`). Git takes short-lived
//! `.lock` files for some of these and fails, rather than waits, when
//! another writer holds them. Concurrent attempts therefore serialize just
//! these calls behind one lock; everything that happens inside a workspace
//! (status, add, commit, push) stays concurrent.
//!
//! The lock is repo-scoped: it lives at
//! `<common_dir>/autopkg-prs/registry.lock`, which is shared by the base
//! checkout and every linked worktree. It is an OS-level `fs2` lock, so it
//! also serializes separate processes working on the same checkout.
//!
//! # Invariants
//!
//! - Acquisition blocks; callers run it on the blocking pool
//! - The lock is released on drop (RAII)
//! - Each acquisition opens its own file handle, so two holders in the same
//!   process exclude each other

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Directory under the common git dir that holds our state.
pub const LOCK_DIR: &str = "autopkg-prs";

/// Lock file name.
pub const LOCK_FILE: &str = "registry.lock";

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Failed to create lock file or directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),
}

/// Compute the lock file path for a common git directory.
pub fn lock_path(common_dir: &Path) -> PathBuf {
    common_dir.join(LOCK_DIR).join(LOCK_FILE)
}

/// An exclusive lock on the worktree registry, held until dropped.
///
/// # Example
///
/// ```no_run
/// use autopkg_prs::git::RegistryLock;
/// use std::path::Path;
///
/// let lock = RegistryLock::acquire(Path::new("/ci/repo/.git")).unwrap();
/// // git worktree add ...
/// drop(lock);
/// ```
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
}

impl RegistryLock {
    /// Acquire the lock, waiting for any other holder to release it.
    ///
    /// # Errors
    ///
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be taken
    pub fn acquire(common_dir: &Path) -> Result<Self, LockError> {
        let dir = common_dir.join(LOCK_DIR);
        fs::create_dir_all(&dir).map_err(|e| {
            LockError::CreateFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = lock_path(common_dir);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        file.lock_exclusive()
            .map_err(|e| LockError::AcquireFailed(e.to_string()))?;
        Ok(Self { file })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
