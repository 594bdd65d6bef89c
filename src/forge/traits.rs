//! forge::traits
//!
//! Pull request publisher contract.
//!
//! # Design
//!
//! Publishing a pull request happens after the branch is pushed, so a
//! failure here never compromises what is already on the remote. The trait
//! still returns `Result`; the engine decides that errors are logged and
//! dropped.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from pull request creation.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// The environment variable naming the target repository is unset.
    #[error("target repository not set: ${var} is empty or missing")]
    MissingRepository {
        /// Variable that was read
        var: String,
    },

    /// The hosting CLI could not be started.
    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// The hosting CLI exited unsuccessfully.
    #[error("pull request creation failed: {0}")]
    Rejected(String),
}

/// Request to create a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrRequest {
    /// Head branch name (the branch with changes)
    pub head: String,
    /// PR title
    pub title: String,
    /// PR body
    pub body: String,
}

impl CreatePrRequest {
    /// The standard request for a recipe update pushed to `branch`.
    pub fn for_recipe(branch: &str, recipe: &str) -> Self {
        Self {
            head: branch.to_string(),
            title: format!("AutoPkg update: {}", recipe),
            body: format!("Automated update for recipe `{}`.", recipe),
        }
    }
}

/// A created pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Web URL, or the raw CLI output when no URL was printed
    pub url: String,
    /// PR number, when it could be read from the URL
    pub number: Option<u64>,
    /// Head branch name
    pub head: String,
}

impl PullRequest {
    /// Build from the CLI's standard output.
    ///
    /// `gh pr create` prints the new PR's URL as its last line.
    pub fn from_output(head: &str, stdout: &str) -> Self {
        let trimmed = stdout.trim();
        let url = trimmed
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| l.starts_with("https://") || l.starts_with("http://"))
            .unwrap_or(trimmed)
            .to_string();
        let number = url
            .rsplit_once("/pull/")
            .and_then(|(_, n)| n.trim_end_matches('/').parse().ok());
        Self {
            url,
            number,
            head: head.to_string(),
        }
    }
}

/// Opens pull requests on a hosting service.
#[async_trait]
pub trait PullRequestPublisher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open a pull request for an already-pushed branch.
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_for_recipe() {
        let req = CreatePrRequest::for_recipe("autopkg/Foo-20240101000000", "Foo");
        assert_eq!(req.head, "autopkg/Foo-20240101000000");
        assert_eq!(req.title, "AutoPkg update: Foo");
        assert_eq!(req.body, "Automated update for recipe `Foo`.");
    }

    #[test]
    fn pr_from_url_output() {
        let pr = PullRequest::from_output(
            "autopkg/Foo",
            "\nCreating pull request for autopkg/Foo into main in acme/munki\n\nhttps://github.com/acme/munki/pull/42\n",
        );
        assert_eq!(pr.url, "https://github.com/acme/munki/pull/42");
        assert_eq!(pr.number, Some(42));
    }

    #[test]
    fn pr_from_unexpected_output() {
        let pr = PullRequest::from_output("autopkg/Foo", "  created  ");
        assert_eq!(pr.url, "created");
        assert_eq!(pr.number, None);
    }

    #[test]
    fn missing_repository_message() {
        let err = ForgeError::MissingRepository {
            var: "GITHUB_REPOSITORY".into(),
        };
        assert_eq!(
            err.to_string(),
            "target repository not set: $GITHUB_REPOSITORY is empty or missing"
        );
    }
}
