//! engine::pipeline
//!
//! One recipe attempt, start to finish.
//!
//! # State machine
//!
//! ```text
//! Pending -> BranchCreated -> WorkspaceReady -> RecipeRun
//!         -> { NoChanges | Published -> { PrOpened | PrSkipped } }
//!         -> WorkspaceReleased
//! ```
//!
//! `Failed` is entered from `Pending`, `BranchCreated`, `WorkspaceReady` or
//! `RecipeRun` and is always followed by `WorkspaceReleased`. Once an attempt
//! is `Published` it cannot fail: a pull request that errors or is
//! cancelled ends in `PrSkipped`.
//!
//! The recipe run and publish race against cancellation, and so does the PR
//! step on its own. Workspace creation and teardown do not, so a cancelled
//! attempt still leaves nothing behind.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::cancel::CancelToken;
use super::context::RunContext;
use super::publish::{publish, ChangeDescriptor, PublishError, PublishTarget};
use super::pull_request::{open_pull_request, PrOutcome};
use super::workspace::{WorkspaceError, WorkspaceGuard};
use crate::core::naming::AttemptNames;
use crate::core::types::{BranchName, RecipeName, RunStamp};
use crate::forge::PullRequest;
use crate::recipe::{RecipeError, RecipeRequest};

/// States an attempt passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    BranchCreated,
    WorkspaceReady,
    RecipeRun,
    NoChanges,
    Published,
    PrOpened,
    PrSkipped,
    Failed,
    WorkspaceReleased,
}

/// Why an attempt stopped early.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("resolution failed: {0}")]
    Resolution(#[source] RecipeError),

    #[error("workspace: {0}")]
    Workspace(#[source] WorkspaceError),

    #[error("recipe execution failed: {0}")]
    RecipeExecution(#[source] RecipeError),

    #[error("publish failed: {0}")]
    Publish(#[source] PublishError),

    #[error("cancelled")]
    Cancelled,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The name could not be mapped to a recipe; no workspace was created.
    Unresolved { error: String },
    /// Another entry resolved to the same recipe and ran instead.
    Duplicate,
    WorkspaceFailed { error: String },
    RecipeFailed { error: String },
    NoChanges,
    /// Pushed; `pr` is `None` when the PR step was skipped or failed.
    Published { pr: Option<PullRequest> },
    PublishFailed { error: String },
    Cancelled,
    /// The attempt task panicked.
    Aborted { error: String },
}

impl AttemptOutcome {
    /// Whether this outcome counts as a failed attempt.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::Unresolved { .. }
                | AttemptOutcome::WorkspaceFailed { .. }
                | AttemptOutcome::RecipeFailed { .. }
                | AttemptOutcome::PublishFailed { .. }
                | AttemptOutcome::Aborted { .. }
        )
    }
}

impl From<&AttemptError> for AttemptOutcome {
    fn from(err: &AttemptError) -> Self {
        match err {
            AttemptError::Resolution(e) => AttemptOutcome::Unresolved {
                error: e.to_string(),
            },
            AttemptError::Workspace(e) => AttemptOutcome::WorkspaceFailed {
                error: e.to_string(),
            },
            AttemptError::RecipeExecution(e) => AttemptOutcome::RecipeFailed {
                error: e.to_string(),
            },
            AttemptError::Publish(e) => AttemptOutcome::PublishFailed {
                error: e.to_string(),
            },
            AttemptError::Cancelled => AttemptOutcome::Cancelled,
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Unresolved { error } => write!(f, "unresolved ({})", error),
            AttemptOutcome::Duplicate => write!(f, "skipped (duplicate)"),
            AttemptOutcome::WorkspaceFailed { error } => write!(f, "workspace failed ({})", error),
            AttemptOutcome::RecipeFailed { error } => write!(f, "recipe failed ({})", error),
            AttemptOutcome::NoChanges => write!(f, "no changes"),
            AttemptOutcome::Published { pr: Some(pr) } => write!(f, "published ({})", pr.url),
            AttemptOutcome::Published { pr: None } => write!(f, "published (no PR)"),
            AttemptOutcome::PublishFailed { error } => write!(f, "publish failed ({})", error),
            AttemptOutcome::Cancelled => write!(f, "cancelled"),
            AttemptOutcome::Aborted { error } => write!(f, "aborted ({})", error),
        }
    }
}

/// Record of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// The recipe list entry
    pub source: String,
    pub recipe: Option<RecipeName>,
    pub branch: Option<BranchName>,
    pub workspace: Option<PathBuf>,
    /// Branch the base checkout was on when the attempt branched off
    pub source_branch: Option<String>,
    pub outcome: AttemptOutcome,
    pub trail: Vec<AttemptState>,
    /// Set when the workspace could not be removed
    pub teardown_error: Option<String>,
}

impl AttemptReport {
    /// A report for an entry that never reached the pipeline.
    pub fn unstarted(source: impl Into<String>, recipe: Option<RecipeName>, outcome: AttemptOutcome) -> Self {
        Self {
            source: source.into(),
            recipe,
            branch: None,
            workspace: None,
            source_branch: None,
            outcome,
            trail: vec![AttemptState::Pending],
            teardown_error: None,
        }
    }

    /// Recipe name, or the list entry when resolution failed.
    pub fn label(&self) -> &str {
        self.recipe
            .as_ref()
            .map(RecipeName::as_str)
            .unwrap_or(&self.source)
    }

    pub fn final_state(&self) -> Option<AttemptState> {
        self.trail.last().copied()
    }
}

/// A resolved recipe ready to run.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub source: String,
    pub recipe: RecipeName,
    pub path: PathBuf,
    pub names: AttemptNames,
    pub stamp: RunStamp,
}

/// Run one attempt to a terminal state.
///
/// Never returns an error: failures are logged with the recipe name and
/// recorded in the report.
pub async fn run_attempt(ctx: &RunContext, attempt: Attempt, mut cancel: CancelToken) -> AttemptReport {
    let mut report = AttemptReport {
        source: attempt.source.clone(),
        recipe: Some(attempt.recipe.clone()),
        branch: Some(attempt.names.branch.clone()),
        workspace: Some(attempt.names.workspace.clone()),
        source_branch: None,
        outcome: AttemptOutcome::Cancelled,
        trail: vec![AttemptState::Pending],
        teardown_error: None,
    };
    let recipe = &attempt.recipe;

    if cancel.is_cancelled() {
        tracing::warn!(recipe = %recipe, "Cancelled before start");
        return report;
    }

    tracing::info!(recipe = %recipe, branch = %attempt.names.branch, "Processing");

    let guard = match WorkspaceGuard::acquire(
        ctx.vcs.clone(),
        &attempt.names.workspace,
        &attempt.names.branch,
    )
    .await
    {
        Ok(guard) => {
            report.trail.push(AttemptState::BranchCreated);
            report.trail.push(AttemptState::WorkspaceReady);
            report.source_branch = guard.source_branch().map(str::to_string);
            guard
        }
        Err(e) => {
            if e.branch_created() {
                report.trail.push(AttemptState::BranchCreated);
            }
            // acquire already tore down anything it created
            report.trail.push(AttemptState::Failed);
            report.trail.push(AttemptState::WorkspaceReleased);
            let err = AttemptError::Workspace(e);
            tracing::error!(recipe = %recipe, error = %err, "Attempt failed");
            report.outcome = AttemptOutcome::from(&err);
            return report;
        }
    };

    let result = {
        let work = run_and_publish(ctx, &attempt, &guard, &mut report.trail);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            r = work => r,
        }
    };

    match result {
        Ok(false) => report.outcome = AttemptOutcome::NoChanges,
        Ok(true) => {
            let pr = pull_request_step(ctx, &attempt, &guard, &mut cancel, &mut report.trail).await;
            report.outcome = AttemptOutcome::Published { pr };
        }
        Err(err) => {
            match &err {
                AttemptError::Cancelled => {
                    tracing::warn!(recipe = %recipe, "Cancelled; removing workspace")
                }
                _ => tracing::error!(recipe = %recipe, error = %err, "Attempt failed"),
            }
            report.trail.push(AttemptState::Failed);
            report.outcome = AttemptOutcome::from(&err);
        }
    }

    if let Err(e) = guard.release().await {
        tracing::error!(recipe = %recipe, error = %e, "Workspace teardown failed");
        report.teardown_error = Some(e.to_string());
    }
    report.trail.push(AttemptState::WorkspaceReleased);
    report
}

/// Run the recipe, then detect and publish its changes.
///
/// Returns whether anything was pushed.
async fn run_and_publish(
    ctx: &RunContext,
    attempt: &Attempt,
    guard: &WorkspaceGuard,
    trail: &mut Vec<AttemptState>,
) -> Result<bool, AttemptError> {
    let request = RecipeRequest {
        name: attempt.recipe.clone(),
        path: attempt.path.clone(),
        workspace: guard.path().to_path_buf(),
        stamp: attempt.stamp,
    };
    let result = ctx
        .runner
        .run(&request)
        .await
        .map_err(AttemptError::RecipeExecution)?;
    trail.push(AttemptState::RecipeRun);
    tracing::info!(recipe = %attempt.recipe, "Recipe complete");

    let changes = ChangeDescriptor::for_result(result, &ctx.settings);
    let target = PublishTarget {
        recipe: &attempt.recipe,
        stamp: &attempt.stamp,
        branch: guard.branch(),
        remote: &ctx.settings.git.remote,
    };
    let published = publish(guard.client(), &changes, &target)
        .await
        .map_err(AttemptError::Publish)?;

    if published {
        trail.push(AttemptState::Published);
    } else {
        tracing::info!(recipe = %attempt.recipe, "No changes to commit");
        trail.push(AttemptState::NoChanges);
    }
    Ok(published)
}

/// Open the pull request for a pushed branch.
///
/// Cancellation skips the PR; the push stands.
async fn pull_request_step(
    ctx: &RunContext,
    attempt: &Attempt,
    guard: &WorkspaceGuard,
    cancel: &mut CancelToken,
    trail: &mut Vec<AttemptState>,
) -> Option<PullRequest> {
    let opening = open_pull_request(ctx.publisher.as_deref(), guard.branch(), &attempt.recipe);
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!(recipe = %attempt.recipe, branch = %guard.branch(), "Cancelled before the pull request was opened; branch stays pushed");
            PrOutcome::Skipped {
                reason: "cancelled".to_string(),
            }
        }
        outcome = opening => outcome,
    };

    match outcome {
        PrOutcome::Opened(pr) => {
            trail.push(AttemptState::PrOpened);
            Some(pr)
        }
        PrOutcome::Skipped { .. } => {
            trail.push(AttemptState::PrSkipped);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ChangeDetection, Config, Settings};
    use crate::engine::cancel::cancellation;
    use crate::forge::mock::MockForge;
    use crate::forge::ForgeError;
    use crate::git::mock::{MockVcs, VcsOp};
    use crate::recipe::mock::{item, MockBehavior, MockFinder, MockRunner};
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use AttemptState::*;

    struct Fixture {
        temp: TempDir,
        vcs: MockVcs,
        runner: MockRunner,
        forge: MockForge,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().join("repo");
            let mut settings = Config::default().resolve(&root);
            settings.git.change_detection = ChangeDetection::Report;
            Self {
                vcs: MockVcs::new(&root),
                runner: MockRunner::new("Munki"),
                forge: MockForge::new(),
                settings,
                temp,
            }
        }

        fn ctx(&self) -> RunContext {
            RunContext::new(
                self.settings.clone(),
                Arc::new(self.vcs.clone()),
                Arc::new(MockFinder::new()),
                Arc::new(self.runner.clone()),
            )
            .with_publisher(Arc::new(self.forge.clone()))
        }

        fn attempt(&self, name: &str) -> Attempt {
            let recipe = RecipeName::new(name).unwrap();
            let stamp = RunStamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
            let names = self
                .settings
                .git
                .naming
                .attempt(&recipe, &stamp, &self.settings.repo_root)
                .unwrap();
            Attempt {
                source: name.to_string(),
                recipe,
                path: PathBuf::from(format!("/recipes/{}.recipe", name)),
                names,
                stamp,
            }
        }

        fn script(&self, name: &str, behavior: MockBehavior) {
            self.runner.clone().on(name, behavior);
        }

        fn root(&self) -> &Path {
            self.temp.path()
        }
    }

    #[tokio::test]
    async fn published_attempt() {
        let f = Fixture::new();
        f.script("Foo", MockBehavior::Import(vec![item("Foo")]));

        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert!(matches!(report.outcome, AttemptOutcome::Published { pr: Some(_) }));
        assert_eq!(
            report.trail,
            vec![Pending, BranchCreated, WorkspaceReady, RecipeRun, Published, PrOpened, WorkspaceReleased]
        );
        assert_eq!(
            report.branch.as_ref().map(BranchName::as_str),
            Some("autopkg/Foo-20240102030405")
        );
        let ws = report.workspace.unwrap();
        assert_eq!(ws, f.root().join("worktree-Foo-20240102030405"));
        assert!(!ws.exists());
        assert_eq!(f.forge.pr_count(), 1);
    }

    #[tokio::test]
    async fn no_changes_attempt() {
        let f = Fixture::new();
        let report = run_attempt(&f.ctx(), f.attempt("Bar"), CancelToken::never()).await;

        assert_eq!(report.outcome, AttemptOutcome::NoChanges);
        assert_eq!(
            report.trail,
            vec![Pending, BranchCreated, WorkspaceReady, RecipeRun, NoChanges, WorkspaceReleased]
        );
        assert!(f.vcs.calls_of(VcsOp::Commit).is_empty());
        assert!(f.vcs.calls_of(VcsOp::Push).is_empty());
        assert_eq!(f.forge.requests().len(), 0);
        assert!(f.vcs.live_worktrees().is_empty());
    }

    #[tokio::test]
    async fn recipe_failure_skips_publish_and_releases() {
        let f = Fixture::new();
        f.script("Foo", MockBehavior::Fail("download failed".into()));

        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert!(matches!(report.outcome, AttemptOutcome::RecipeFailed { ref error } if error.contains("download failed")));
        assert_eq!(
            report.trail,
            vec![Pending, BranchCreated, WorkspaceReady, Failed, WorkspaceReleased]
        );
        assert!(f.vcs.calls_of(VcsOp::Add).is_empty());
        assert!(f.vcs.live_worktrees().is_empty());
    }

    #[tokio::test]
    async fn pr_failure_keeps_published() {
        let mut f = Fixture::new();
        f.forge = MockForge::failing(ForgeError::Rejected("boom".into()));
        f.script("Foo", MockBehavior::Import(vec![item("Foo")]));

        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert_eq!(report.outcome, AttemptOutcome::Published { pr: None });
        assert!(report.trail.contains(&PrSkipped));
        assert_eq!(f.vcs.calls_of(VcsOp::Push).len(), 1);
    }

    #[tokio::test]
    async fn push_failure_is_publish_failed() {
        let mut f = Fixture::new();
        f.vcs = f.vcs.clone().fail_on(VcsOp::Push, None);
        f.script("Foo", MockBehavior::Import(vec![item("Foo")]));

        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert!(matches!(report.outcome, AttemptOutcome::PublishFailed { .. }));
        assert_eq!(f.forge.requests().len(), 0);
        assert!(f.vcs.live_worktrees().is_empty());
    }

    #[tokio::test]
    async fn workspace_failure_never_runs_recipe() {
        let mut f = Fixture::new();
        f.vcs = f.vcs.clone().fail_on(VcsOp::AddWorktree, None);

        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert!(matches!(report.outcome, AttemptOutcome::WorkspaceFailed { .. }));
        assert_eq!(report.trail, vec![Pending, BranchCreated, Failed, WorkspaceReleased]);
        assert!(f.runner.requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_still_releases() {
        let f = Fixture::new();
        f.script("Foo", MockBehavior::Hang);
        let (handle, token) = cancellation();
        let ctx = f.ctx();

        let attempt = f.attempt("Foo");
        let run = run_attempt(&ctx, attempt, token);
        let cancel_later = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (report, ()) = tokio::join!(run, cancel_later);

        assert_eq!(report.outcome, AttemptOutcome::Cancelled);
        assert_eq!(report.final_state(), Some(WorkspaceReleased));
        assert!(f.vcs.live_worktrees().is_empty());
    }

    #[tokio::test]
    async fn cancel_while_opening_pr_keeps_the_push() {
        let mut f = Fixture::new();
        f.forge = MockForge::hanging();
        f.script("Foo", MockBehavior::Import(vec![item("Foo")]));
        let (handle, token) = cancellation();
        let ctx = f.ctx();

        let run = run_attempt(&ctx, f.attempt("Foo"), token);
        let cancel_later = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        };
        let (report, ()) = tokio::join!(run, cancel_later);

        assert_eq!(report.outcome, AttemptOutcome::Published { pr: None });
        assert_eq!(
            report.trail,
            vec![Pending, BranchCreated, WorkspaceReady, RecipeRun, Published, PrSkipped, WorkspaceReleased]
        );
        assert!(!report.trail.contains(&Failed));
        assert_eq!(f.vcs.calls_of(VcsOp::Push).len(), 1);
        assert_eq!(f.forge.requests().len(), 1);
        assert_eq!(f.forge.pr_count(), 0);
        assert!(f.vcs.live_worktrees().is_empty());
    }

    #[tokio::test]
    async fn branch_failure_still_ends_released() {
        let mut f = Fixture::new();
        f.vcs = f.vcs.clone().fail_on(VcsOp::Branch, None);

        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert!(matches!(report.outcome, AttemptOutcome::WorkspaceFailed { .. }));
        assert_eq!(report.trail, vec![Pending, Failed, WorkspaceReleased]);
        assert!(f.vcs.calls_of(VcsOp::AddWorktree).is_empty());
        assert!(f.runner.requests().is_empty());
    }

    #[tokio::test]
    async fn report_records_source_branch() {
        let f = Fixture::new();
        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert_eq!(report.source_branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn status_fallback_when_unreported() {
        let f = Fixture::new();
        f.script(
            "Foo",
            MockBehavior::Unreported(vec![PathBuf::from("Munki/pkgsinfo/foo.plist")]),
        );

        let report = run_attempt(&f.ctx(), f.attempt("Foo"), CancelToken::never()).await;

        assert!(matches!(report.outcome, AttemptOutcome::Published { .. }));
        assert_eq!(f.vcs.calls_of(VcsOp::Status).len(), 1);
        assert_eq!(f.vcs.calls_of(VcsOp::Add)[0].detail, "Munki");
    }
}
