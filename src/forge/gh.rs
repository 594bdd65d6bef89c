//! forge::gh
//!
//! Pull request creation through the GitHub CLI.
//!
//! The target repository comes from an environment variable holding
//! `owner/repo` (`GITHUB_REPOSITORY` in GitHub Actions). It is read when the
//! PR is created, not when the publisher is built, so a missing value only
//! affects the PR step.

use std::path::PathBuf;

use async_trait::async_trait;

use super::traits::{CreatePrRequest, ForgeError, PullRequest, PullRequestPublisher};
use crate::core::config::PullRequestSettings;
use crate::process::{Invocation, ProcessError};

/// [`PullRequestPublisher`] that runs `gh pr create`.
#[derive(Debug, Clone)]
pub struct GhCli {
    program: PathBuf,
    repo_env: String,
    /// Overrides the environment lookup
    repository: Option<String>,
    base: Option<String>,
    draft: bool,
    labels: Vec<String>,
}

impl GhCli {
    pub fn from_settings(settings: &PullRequestSettings) -> Self {
        Self {
            program: settings.cli.clone(),
            repo_env: settings.repo_env.clone(),
            repository: None,
            base: settings.base.clone(),
            draft: settings.draft,
            labels: settings.labels.clone(),
        }
    }

    /// Use `owner/repo` instead of reading the environment.
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    fn repository(&self) -> Result<String, ForgeError> {
        if let Some(repo) = &self.repository {
            return Ok(repo.clone());
        }
        match std::env::var(&self.repo_env) {
            Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(ForgeError::MissingRepository {
                var: self.repo_env.clone(),
            }),
        }
    }

    /// The `gh pr create` invocation for `request`.
    pub fn invocation(&self, request: &CreatePrRequest) -> Result<Invocation, ForgeError> {
        let mut cmd = Invocation::new(&self.program).args([
            "pr".to_string(),
            "create".to_string(),
            format!("--repo={}", self.repository()?),
            format!("--head={}", request.head),
            format!("--title={}", request.title),
            format!("--body={}", request.body),
        ]);
        if let Some(base) = &self.base {
            cmd = cmd.arg(format!("--base={}", base));
        }
        if self.draft {
            cmd = cmd.arg("--draft");
        }
        for label in &self.labels {
            cmd = cmd.arg(format!("--label={}", label));
        }
        Ok(cmd)
    }
}

#[async_trait]
impl PullRequestPublisher for GhCli {
    fn name(&self) -> &'static str {
        "gh"
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let cmd = self.invocation(&request)?;
        match cmd.run_checked().await {
            Ok(out) => Ok(PullRequest::from_output(&request.head, &out.stdout)),
            Err(ProcessError::Spawn { program, source }) => Err(ForgeError::Spawn {
                program,
                message: source.to_string(),
            }),
            Err(e) => Err(ForgeError::Rejected(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PullRequestSettings {
        PullRequestSettings {
            enabled: true,
            cli: PathBuf::from("gh"),
            repo_env: "AUTOPKG_PRS_TEST_UNSET_REPO".to_string(),
            base: None,
            draft: false,
            labels: Vec::new(),
        }
    }

    #[test]
    fn invocation_minimal() {
        let gh = GhCli::from_settings(&settings()).with_repository("acme/munki");
        let req = CreatePrRequest::for_recipe("autopkg/Foo-20240101000000", "Foo");
        let cmd = gh.invocation(&req).unwrap();
        assert_eq!(
            cmd.arguments(),
            [
                "pr",
                "create",
                "--repo=acme/munki",
                "--head=autopkg/Foo-20240101000000",
                "--title=AutoPkg update: Foo",
                "--body=Automated update for recipe `Foo`.",
            ]
        );
    }

    #[test]
    fn invocation_with_options() {
        let mut s = settings();
        s.base = Some("main".into());
        s.draft = true;
        s.labels = vec!["autopkg".into(), "automerge".into()];
        let gh = GhCli::from_settings(&s).with_repository("acme/munki");
        let cmd = gh
            .invocation(&CreatePrRequest::for_recipe("b", "Foo"))
            .unwrap();
        assert_eq!(
            &cmd.arguments()[6..],
            ["--base=main", "--draft", "--label=autopkg", "--label=automerge"]
        );
    }

    #[test]
    fn missing_repository_env() {
        let gh = GhCli::from_settings(&settings());
        let err = gh
            .invocation(&CreatePrRequest::for_recipe("b", "Foo"))
            .unwrap_err();
        assert!(matches!(err, ForgeError::MissingRepository { var } if var == "AUTOPKG_PRS_TEST_UNSET_REPO"));
    }

    #[tokio::test]
    async fn missing_cli_is_spawn_error() {
        let mut s = settings();
        s.cli = PathBuf::from("definitely-not-gh-xyz");
        let gh = GhCli::from_settings(&s).with_repository("acme/munki");
        let err = gh
            .create_pr(CreatePrRequest::for_recipe("b", "Foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_url_is_parsed() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("gh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho https://github.com/acme/munki/pull/7\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut s = settings();
        s.cli = script;
        let pr = GhCli::from_settings(&s)
            .with_repository("acme/munki")
            .create_pr(CreatePrRequest::for_recipe("autopkg/Foo", "Foo"))
            .await
            .unwrap();
        assert_eq!(pr.number, Some(7));
        assert_eq!(pr.head, "autopkg/Foo");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_rejected() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("gh");
        std::fs::write(&script, "#!/bin/sh\necho 'already exists' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut s = settings();
        s.cli = script;
        let err = GhCli::from_settings(&s)
            .with_repository("acme/munki")
            .create_pr(CreatePrRequest::for_recipe("b", "Foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Rejected(m) if m.contains("already exists")));
    }
}
