//! engine::context
//!
//! The read-only context shared by every attempt in a run.

use std::fmt;
use std::sync::Arc;

use crate::core::config::Settings;
use crate::forge::PullRequestPublisher;
use crate::git::VersionControl;
use crate::recipe::{RecipeFinder, RecipeRunner};

/// Settings and collaborators for one run.
///
/// Built once before the orchestrator starts and never mutated afterwards;
/// attempts hold it through an `Arc`.
#[derive(Clone)]
pub struct RunContext {
    pub settings: Arc<Settings>,
    /// Client for the base checkout
    pub vcs: Arc<dyn VersionControl>,
    pub finder: Arc<dyn RecipeFinder>,
    pub runner: Arc<dyn RecipeRunner>,
    /// `None` when pull requests are disabled
    pub publisher: Option<Arc<dyn PullRequestPublisher>>,
}

impl RunContext {
    pub fn new(
        settings: Settings,
        vcs: Arc<dyn VersionControl>,
        finder: Arc<dyn RecipeFinder>,
        runner: Arc<dyn RecipeRunner>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            vcs,
            finder,
            runner,
            publisher: None,
        }
    }

    /// Open pull requests with `publisher` after each push.
    pub fn with_publisher(mut self, publisher: Arc<dyn PullRequestPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("settings", &self.settings)
            .field("repo", &self.vcs.path())
            .field(
                "publisher",
                &self.publisher.as_ref().map(|p| p.name()),
            )
            .finish()
    }
}
