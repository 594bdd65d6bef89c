//! engine::publish
//!
//! Change detection, then stage, commit and push.
//!
//! # Change detection
//!
//! The recipe report is the preferred signal: it says exactly which icon
//! and pkginfo files were written, so exactly those are staged. When the
//! runner produced no report, or the deployment selects
//! [`ChangeDetection::Status`], the worktree's porcelain status decides and
//! the configured stage root is staged as a whole.
//!
//! Nothing is staged, committed or pushed when there are no changes.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::config::{ChangeDetection, Settings};
use crate::core::types::{BranchName, RecipeName, RunStamp};
use crate::git::{GitError, VersionControl};
use crate::recipe::{ImportedItem, RecipeResult};

/// Errors after changes were detected (or while detecting them).
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("status check failed: {0}")]
    Detect(#[source] GitError),

    #[error("staging failed: {0}")]
    Stage(#[source] GitError),

    #[error("commit failed: {0}")]
    Commit(#[source] GitError),

    #[error("push failed: {0}")]
    Push(#[source] GitError),
}

/// What to inspect to decide whether the attempt changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDescriptor {
    /// Items from the recipe report; paths are relative to `munki_repo`.
    Imported {
        items: Vec<ImportedItem>,
        munki_repo: PathBuf,
    },
    /// The worktree status; changes are staged under `stage_root`.
    WorkingTree { stage_root: PathBuf },
}

impl ChangeDescriptor {
    /// Pick the descriptor for `result` under the configured policy.
    pub fn for_result(result: RecipeResult, settings: &Settings) -> Self {
        match (settings.git.change_detection, result.imported) {
            (ChangeDetection::Report, Some(items)) => ChangeDescriptor::Imported {
                items,
                munki_repo: settings.munki_repo.clone(),
            },
            (ChangeDetection::Report, None) => {
                tracing::debug!("No recipe report; falling back to worktree status");
                ChangeDescriptor::WorkingTree {
                    stage_root: settings.git.stage_root.clone(),
                }
            }
            (ChangeDetection::Status, _) => ChangeDescriptor::WorkingTree {
                stage_root: settings.git.stage_root.clone(),
            },
        }
    }
}

/// Commit message for a recipe update.
pub fn commit_message(recipe: &RecipeName, stamp: &RunStamp) -> String {
    format!("AutoPkg {} {}", recipe, stamp.iso8601())
}

/// Where and how to publish.
#[derive(Debug, Clone)]
pub struct PublishTarget<'a> {
    pub recipe: &'a RecipeName,
    pub stamp: &'a RunStamp,
    pub branch: &'a BranchName,
    pub remote: &'a str,
}

/// Stage, commit and push if `changes` is non-empty.
///
/// Returns `Ok(false)` without touching the index when there is nothing to
/// publish.
pub async fn publish(
    client: &dyn VersionControl,
    changes: &ChangeDescriptor,
    target: &PublishTarget<'_>,
) -> Result<bool, PublishError> {
    let (paths, all_changes) = match changes {
        ChangeDescriptor::Imported { items, munki_repo } => {
            if items.is_empty() {
                return Ok(false);
            }
            (imported_paths(items, munki_repo), false)
        }
        ChangeDescriptor::WorkingTree { stage_root } => {
            let status = client.status(true).await.map_err(PublishError::Detect)?;
            if status.trim().is_empty() {
                return Ok(false);
            }
            (vec![stage_root.clone()], true)
        }
    };

    client.add(&paths).await.map_err(PublishError::Stage)?;
    client
        .commit(&commit_message(target.recipe, target.stamp), all_changes)
        .await
        .map_err(PublishError::Commit)?;
    client
        .push(target.branch, target.remote, true)
        .await
        .map_err(PublishError::Push)?;

    tracing::info!(recipe = %target.recipe, branch = %target.branch, "Pushed branch");
    Ok(true)
}

/// Workspace-relative paths to stage for `items`.
///
/// An item that names no files still counts as a change; the munki repo is
/// staged as a whole in that case.
fn imported_paths(items: &[ImportedItem], munki_repo: &Path) -> Vec<PathBuf> {
    let paths: Vec<PathBuf> = items
        .iter()
        .flat_map(ImportedItem::changed_paths)
        .map(|p| munki_repo.join(p))
        .collect();
    if paths.is_empty() {
        vec![munki_repo.to_path_buf()]
    } else {
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::mock::{MockVcs, VcsOp};
    use crate::recipe::mock::item;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        vcs: MockVcs,
        workspace: PathBuf,
        recipe: RecipeName,
        stamp: RunStamp,
        branch: BranchName,
    }

    impl Fixture {
        async fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let vcs = MockVcs::new(temp.path().join("repo"));
            let workspace = temp.path().join("worktree-Foo");
            vcs.add_worktree(&workspace, "autopkg/Foo").await.unwrap();
            Self {
                _temp: temp,
                vcs,
                workspace,
                recipe: RecipeName::new("Foo").unwrap(),
                stamp: RunStamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
                branch: BranchName::new("autopkg/Foo-20240102030405").unwrap(),
            }
        }

        fn target(&self) -> PublishTarget<'_> {
            PublishTarget {
                recipe: &self.recipe,
                stamp: &self.stamp,
                branch: &self.branch,
                remote: "origin",
            }
        }

        fn write(&self, rel: &str) {
            let p = self.workspace.join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "x").unwrap();
        }

        async fn publish(&self, changes: &ChangeDescriptor) -> Result<bool, PublishError> {
            let client = self.vcs.scoped_to(&self.workspace);
            publish(client.as_ref(), changes, &self.target()).await
        }
    }

    fn settings(detection: ChangeDetection) -> Settings {
        let mut s = Settings::default();
        s.git.change_detection = detection;
        s
    }

    #[test]
    fn commit_message_format() {
        let stamp = RunStamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(
            commit_message(&RecipeName::new("Foo").unwrap(), &stamp),
            "AutoPkg Foo 2024-01-02T03:04:05+00:00"
        );
    }

    #[test]
    fn report_policy_uses_items() {
        let d = ChangeDescriptor::for_result(
            RecipeResult::with_items(vec![item("Foo")]),
            &settings(ChangeDetection::Report),
        );
        assert!(matches!(d, ChangeDescriptor::Imported { ref items, .. } if items.len() == 1));
    }

    #[test]
    fn report_policy_falls_back_without_report() {
        let d = ChangeDescriptor::for_result(
            RecipeResult::unreported(),
            &settings(ChangeDetection::Report),
        );
        assert_eq!(
            d,
            ChangeDescriptor::WorkingTree {
                stage_root: PathBuf::from("Munki")
            }
        );
    }

    #[test]
    fn status_policy_ignores_items() {
        let d = ChangeDescriptor::for_result(
            RecipeResult::with_items(vec![item("Foo")]),
            &settings(ChangeDetection::Status),
        );
        assert!(matches!(d, ChangeDescriptor::WorkingTree { .. }));
    }

    #[tokio::test]
    async fn no_items_means_no_git_calls() {
        let f = Fixture::new().await;
        let changes = ChangeDescriptor::Imported {
            items: vec![],
            munki_repo: "Munki".into(),
        };
        assert!(!f.publish(&changes).await.unwrap());
        assert!(f.vcs.calls_of(VcsOp::Add).is_empty());
        assert!(f.vcs.calls_of(VcsOp::Commit).is_empty());
        assert!(f.vcs.calls_of(VcsOp::Push).is_empty());
    }

    #[tokio::test]
    async fn items_stage_exact_paths_then_commit_and_push() {
        let f = Fixture::new().await;
        f.write("Munki/icons/foo.png");
        f.write("Munki/pkgsinfo/foo.plist");
        f.write("Munki/icons/bar.png");
        f.write("Munki/pkgsinfo/bar.plist");
        let changes = ChangeDescriptor::Imported {
            items: vec![item("Foo"), item("Bar")],
            munki_repo: "Munki".into(),
        };

        assert!(f.publish(&changes).await.unwrap());

        let adds = f.vcs.calls_of(VcsOp::Add);
        assert_eq!(adds.len(), 1);
        assert_eq!(
            adds[0].detail,
            "Munki/icons/foo.png Munki/pkgsinfo/foo.plist Munki/icons/bar.png Munki/pkgsinfo/bar.plist"
        );

        let commits = f.vcs.calls_of(VcsOp::Commit);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].detail, "AutoPkg Foo 2024-01-02T03:04:05+00:00");

        let pushes = f.vcs.calls_of(VcsOp::Push);
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].detail, "origin autopkg/Foo-20240102030405");
    }

    #[tokio::test]
    async fn clean_status_is_not_published() {
        let f = Fixture::new().await;
        let changes = ChangeDescriptor::WorkingTree {
            stage_root: "Munki".into(),
        };
        assert!(!f.publish(&changes).await.unwrap());
        assert_eq!(f.vcs.calls_of(VcsOp::Status).len(), 1);
        assert!(f.vcs.calls_of(VcsOp::Commit).is_empty());
    }

    #[tokio::test]
    async fn dirty_status_stages_root() {
        let f = Fixture::new().await;
        f.write("Munki/pkgsinfo/foo.plist");
        let changes = ChangeDescriptor::WorkingTree {
            stage_root: "Munki".into(),
        };
        assert!(f.publish(&changes).await.unwrap());
        assert_eq!(f.vcs.calls_of(VcsOp::Add)[0].detail, "Munki");
        assert_eq!(f.vcs.calls_of(VcsOp::Push).len(), 1);
    }

    #[tokio::test]
    async fn push_failure_propagates() {
        let f = Fixture::new().await;
        let vcs = f.vcs.clone().fail_on(VcsOp::Push, None);
        f.write("Munki/pkgsinfo/foo.plist");
        let changes = ChangeDescriptor::WorkingTree {
            stage_root: "Munki".into(),
        };

        let client = vcs.scoped_to(&f.workspace);
        let err = publish(client.as_ref(), &changes, &f.target())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Push(_)));
        assert_eq!(f.vcs.calls_of(VcsOp::Commit).len(), 1);
    }

    #[test]
    fn item_without_paths_stages_repo() {
        let items = vec![ImportedItem {
            name: "Foo".into(),
            ..Default::default()
        }];
        assert_eq!(
            imported_paths(&items, Path::new("Munki")),
            vec![PathBuf::from("Munki")]
        );
    }
}
