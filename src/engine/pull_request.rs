//! engine::pull_request
//!
//! Best-effort pull request step.
//!
//! Runs after a successful push. Every failure is logged with the recipe
//! name and turned into [`PrOutcome::Skipped`]; nothing here can fail the
//! attempt or touch the pushed branch.

use crate::core::types::{BranchName, RecipeName};
use crate::forge::{CreatePrRequest, PullRequest, PullRequestPublisher};

/// Result of the pull request step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrOutcome {
    Opened(PullRequest),
    Skipped { reason: String },
}

/// Open a pull request for `branch`, logging instead of failing.
pub async fn open_pull_request(
    publisher: Option<&dyn PullRequestPublisher>,
    branch: &BranchName,
    recipe: &RecipeName,
) -> PrOutcome {
    let Some(publisher) = publisher else {
        tracing::info!(recipe = %recipe, "Pull requests disabled; skipping");
        return PrOutcome::Skipped {
            reason: "disabled".to_string(),
        };
    };

    let request = CreatePrRequest::for_recipe(branch.as_str(), recipe.as_str());
    match publisher.create_pr(request).await {
        Ok(pr) => {
            tracing::info!(recipe = %recipe, url = %pr.url, "Opened PR");
            PrOutcome::Opened(pr)
        }
        Err(e) => {
            tracing::error!(recipe = %recipe, branch = %branch, error = %e, "Failed to create PR");
            PrOutcome::Skipped {
                reason: e.to_string(),
            }
        }
    }
}
