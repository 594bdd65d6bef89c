//! engine::orchestrator
//!
//! Fans the per-recipe pipeline out across the recipe list.
//!
//! # Phases
//!
//! 1. **Resolve**: every entry is looked up concurrently. Entries that do
//!    not resolve are reported and never get a workspace. Entries resolving
//!    to a recipe already claimed by an earlier entry are reported as
//!    duplicates.
//! 2. **Run**: each resolved recipe becomes its own task running
//!    [`run_attempt`]. An optional semaphore bounds how many are inside the
//!    pipeline at once.
//! 3. **Settle**: every task is awaited. One attempt failing never stops or
//!    short-circuits another; the summary only feeds logging.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::cancel::CancelToken;
use super::context::RunContext;
use super::pipeline::{run_attempt, Attempt, AttemptError, AttemptOutcome, AttemptReport};
use crate::core::types::{RecipeName, RunStamp};
use crate::recipe::RecipeError;

/// Result of resolving one recipe list entry.
#[derive(Debug)]
pub struct Resolution {
    pub source: String,
    pub result: Result<(RecipeName, PathBuf), RecipeError>,
}

/// All attempt reports from one run, in recipe list order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub attempts: Vec<AttemptReport>,
}

impl RunSummary {
    pub fn published(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Published { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::NoChanges))
    }

    pub fn failed(&self) -> usize {
        self.count(AttemptOutcome::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Duplicate | AttemptOutcome::Cancelled))
    }

    /// Attempts whose workspace could not be removed.
    pub fn leaked(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.teardown_error.is_some())
            .count()
    }

    fn count(&self, f: impl Fn(&AttemptOutcome) -> bool) -> usize {
        self.attempts.iter().filter(|a| f(&a.outcome)).count()
    }

    /// Log one line per attempt and the totals.
    pub fn log(&self) {
        for a in &self.attempts {
            if a.outcome.is_failure() {
                tracing::error!(recipe = %a.label(), "{}", a.outcome);
            } else {
                tracing::info!(recipe = %a.label(), "{}", a.outcome);
            }
        }
        tracing::info!("{}", self);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} recipes: {} published, {} unchanged, {} failed, {} skipped",
            self.attempts.len(),
            self.published(),
            self.unchanged(),
            self.failed(),
            self.skipped()
        )?;
        let leaked = self.leaked();
        if leaked > 0 {
            write!(f, ", {} workspaces not removed", leaked)?;
        }
        Ok(())
    }
}

/// Runs the recipe list.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    ctx: Arc<RunContext>,
    stamp: Option<RunStamp>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx, stamp: None }
    }

    /// Use a fixed timestamp for branch and workspace names.
    pub fn with_stamp(mut self, stamp: RunStamp) -> Self {
        self.stamp = Some(stamp);
        self
    }

    /// Resolve every entry concurrently, preserving order.
    pub async fn resolve(&self, sources: &[String]) -> Vec<Resolution> {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let ctx = Arc::clone(&self.ctx);
                let source = source.clone();
                tokio::spawn(async move {
                    let result = match ctx.finder.find_recipe(&source).await {
                        Ok(path) => RecipeName::from_path(&path)
                            .map(|name| (name, path))
                            .map_err(RecipeError::from),
                        Err(e) => Err(e),
                    };
                    Resolution { source, result }
                })
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for (handle, source) in handles.into_iter().zip(sources) {
            out.push(match handle.await {
                Ok(r) => r,
                Err(e) => Resolution {
                    source: source.clone(),
                    result: Err(RecipeError::Internal(e.to_string())),
                },
            });
        }
        out
    }

    /// Process every entry and wait for all of them to settle.
    pub async fn run(&self, sources: &[String], cancel: CancelToken) -> RunSummary {
        let stamp = self.stamp.unwrap_or_else(RunStamp::now);
        let settings = &self.ctx.settings;
        let limit = settings.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        let mut claimed = HashSet::new();
        let mut slots: Vec<Slot> = Vec::new();

        for resolution in self.resolve(sources).await {
            let Resolution { source, result } = resolution;
            let (recipe, path) = match result {
                Ok(found) => found,
                Err(e) => {
                    let err = AttemptError::Resolution(e);
                    tracing::error!(recipe = %source, error = %err, "Skipping recipe");
                    slots.push(Slot::Done(AttemptReport::unstarted(
                        source,
                        None,
                        AttemptOutcome::from(&err),
                    )));
                    continue;
                }
            };

            if !claimed.insert(recipe.clone()) {
                tracing::warn!(recipe = %recipe, entry = %source, "Duplicate recipe; skipping");
                slots.push(Slot::Done(AttemptReport::unstarted(
                    source,
                    Some(recipe),
                    AttemptOutcome::Duplicate,
                )));
                continue;
            }

            let names = match settings.git.naming.attempt(&recipe, &stamp, &settings.repo_root) {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(recipe = %recipe, error = %e, "Cannot name branch");
                    slots.push(Slot::Done(AttemptReport::unstarted(
                        source,
                        Some(recipe),
                        AttemptOutcome::WorkspaceFailed {
                            error: e.to_string(),
                        },
                    )));
                    continue;
                }
            };

            let attempt = Attempt {
                source,
                recipe,
                path,
                names,
                stamp,
            };
            slots.push(Slot::Running(
                attempt.source.clone(),
                attempt.recipe.clone(),
                self.spawn(attempt, limit.clone(), cancel.clone()),
            ));
        }

        let mut attempts = Vec::with_capacity(slots.len());
        for slot in slots {
            attempts.push(match slot {
                Slot::Done(report) => report,
                Slot::Running(source, recipe, handle) => match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::error!(recipe = %recipe, error = %e, "Attempt task aborted");
                        AttemptReport::unstarted(
                            source,
                            Some(recipe),
                            AttemptOutcome::Aborted {
                                error: e.to_string(),
                            },
                        )
                    }
                },
            });
        }

        RunSummary { attempts }
    }

    fn spawn(
        &self,
        attempt: Attempt,
        limit: Option<Arc<Semaphore>>,
        mut cancel: CancelToken,
    ) -> JoinHandle<AttemptReport> {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let _permit = match limit {
                Some(sem) => {
                    let acquired = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        p = sem.acquire_owned() => p.ok(),
                    };
                    match acquired {
                        Some(p) => Some(p),
                        None => {
                            return AttemptReport::unstarted(
                                attempt.source,
                                Some(attempt.recipe),
                                AttemptOutcome::Cancelled,
                            )
                        }
                    }
                }
                None => None,
            };
            run_attempt(&ctx, attempt, cancel).await
        })
    }
}

enum Slot {
    Done(AttemptReport),
    Running(String, RecipeName, JoinHandle<AttemptReport>),
}
