//! engine
//!
//! The per-recipe isolation-and-publish pipeline.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──(one task per recipe)──> run_attempt
//!     WorkspaceGuard::acquire   branch + worktree
//!     RecipeRunner::run         inside the worktree
//!     publish                   detect, stage, commit, push
//!     open_pull_request         best effort
//!     WorkspaceGuard::release   prune + forced remove (always)
//! ```
//!
//! # Invariants
//!
//! - Only [`WorkspaceGuard`] creates or removes worktrees
//! - The base checkout is never written; all changes happen in a worktree
//! - No commit or push without a non-empty change set
//! - A failing attempt never affects another; the run settles every attempt
//! - Every workspace is removed by the time its attempt reports
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use autopkg_prs::core::config::Settings;
//! use autopkg_prs::engine::{cancellation, Orchestrator, RunContext};
//! use autopkg_prs::forge::GhCli;
//! use autopkg_prs::git::GitClient;
//! use autopkg_prs::recipe::{AutopkgRunner, DirRecipeFinder};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::default();
//! let ctx = RunContext::new(
//!     settings.clone(),
//!     Arc::new(GitClient::open(&settings.repo_root).unwrap()),
//!     Arc::new(DirRecipeFinder::from_settings(&settings)),
//!     Arc::new(AutopkgRunner::from_settings(&settings)),
//! )
//! .with_publisher(Arc::new(GhCli::from_settings(&settings.pull_request)));
//!
//! let (_handle, token) = cancellation();
//! let summary = Orchestrator::new(Arc::new(ctx))
//!     .run(&["Firefox.munki".to_string()], token)
//!     .await;
//! summary.log();
//! # });
//! ```

pub mod cancel;
pub mod context;
pub mod orchestrator;
pub mod pipeline;
pub mod publish;
pub mod pull_request;
pub mod workspace;

pub use cancel::{cancel_on_shutdown, cancellation, CancelHandle, CancelToken};
pub use context::RunContext;
pub use orchestrator::{Orchestrator, Resolution, RunSummary};
pub use pipeline::{
    run_attempt, Attempt, AttemptError, AttemptOutcome, AttemptReport, AttemptState,
};
pub use publish::{commit_message, publish, ChangeDescriptor, PublishError, PublishTarget};
pub use pull_request::{open_pull_request, PrOutcome};
pub use workspace::{WorkspaceError, WorkspaceGuard};
