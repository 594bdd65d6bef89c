//! core::config::schema
//!
//! Configuration schema types.
//!
//! # File Format
//!
//! ```toml
//! recipe_list = "AutoPkg/recipe_list.json"
//! report_dir = "AutoPkg/Reports"
//! log_file = "autopkg_runner.log"
//! verbosity = 1
//! cache_plugin = "json"
//! cache_file = "metadata_cache.json"
//! munki_repo = "Munki"
//! max_concurrency = 4
//!
//! [git]
//! remote = "origin"
//! branch_namespace = "autopkg"
//! change_detection = "report"
//!
//! [autopkg]
//! binary = "/usr/local/bin/autopkg"
//! search_dirs = ["AutoPkg/Recipes"]
//!
//! [pull_request]
//! repo_env = "GITHUB_REPOSITORY"
//! labels = ["autopkg"]
//! ```
//!
//! # Validation
//!
//! Unknown keys are rejected at parse time. Values are validated after
//! parsing (e.g. the branch namespace must produce valid branch names).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::naming::Naming;
use crate::core::types::{RecipeName, RunStamp};

/// How the publish step decides whether a recipe produced changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// Use the imported items reported by the recipe runner, staging exactly
    /// their paths. Falls back to `Status` when the runner produced no report.
    #[default]
    Report,
    /// Use `git status --porcelain` in the workspace, staging the stage root.
    Status,
}

impl std::fmt::Display for ChangeDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeDetection::Report => write!(f, "report"),
            ChangeDetection::Status => write!(f, "status"),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// JSON recipe list
    pub recipe_list: Option<PathBuf>,

    /// Directory for recipe run reports
    pub report_dir: Option<PathBuf>,

    /// Log file (empty string disables file logging)
    pub log_file: Option<PathBuf>,

    /// Verbosity level (0 = info)
    pub verbosity: Option<u8>,

    /// Metadata cache backend used by the recipe engine
    pub cache_plugin: Option<String>,

    /// Metadata cache location
    pub cache_file: Option<PathBuf>,

    /// Munki repository, relative to the repository root
    pub munki_repo: Option<PathBuf>,

    /// Upper bound on attempts running at once
    pub max_concurrency: Option<usize>,

    /// Cancel the run after this many seconds
    pub run_timeout_secs: Option<u64>,

    /// Version control settings
    pub git: Option<GitConfig>,

    /// Recipe engine settings
    pub autopkg: Option<AutopkgConfig>,

    /// Pull request settings
    pub pull_request: Option<PullRequestConfig>,
}

impl FileConfig {
    /// Valid metadata cache backends.
    pub const VALID_CACHE_PLUGINS: &'static [&'static str] = &["json", "sqlite", "memory"];

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(plugin) = &self.cache_plugin {
            if !Self::VALID_CACHE_PLUGINS.contains(&plugin.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid cache plugin '{}', must be one of: {}",
                    plugin,
                    Self::VALID_CACHE_PLUGINS.join(", ")
                )));
            }
        }

        if self.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidValue(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        if self.run_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "run_timeout_secs must be at least 1".to_string(),
            ));
        }

        if let Some(git) = &self.git {
            git.validate()?;
        }
        if let Some(autopkg) = &self.autopkg {
            autopkg.validate()?;
        }
        if let Some(pr) = &self.pull_request {
            pr.validate()?;
        }

        Ok(())
    }
}

/// Version control settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    /// git executable
    pub binary: Option<PathBuf>,

    /// Remote to push attempt branches to (default: "origin")
    pub remote: Option<String>,

    /// First component of every attempt branch (default: "autopkg")
    pub branch_namespace: Option<String>,

    /// Prefix of workspace directory names (default: "worktree")
    pub worktree_prefix: Option<String>,

    /// Change detection policy
    pub change_detection: Option<ChangeDetection>,

    /// Directory staged under the status policy (default: the munki repo)
    pub stage_root: Option<PathBuf>,
}

impl GitConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(remote) = &self.remote {
            if remote.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "remote cannot be empty".to_string(),
                ));
            }
        }

        if let Some(prefix) = &self.worktree_prefix {
            if prefix.is_empty() || prefix.contains(['/', '\\']) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid worktree prefix '{}'",
                    prefix
                )));
            }
        }

        if let Some(namespace) = &self.branch_namespace {
            // Probe with a representative name so bad namespaces fail at load time
            let probe = RecipeName::new("probe")
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            Naming::new(namespace.clone(), "worktree")
                .branch(&probe, &RunStamp::now())
                .map_err(|e| {
                    ConfigError::InvalidValue(format!("invalid branch namespace: {}", e))
                })?;
        }

        Ok(())
    }
}

/// Recipe engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AutopkgConfig {
    /// autopkg executable
    pub binary: Option<PathBuf>,

    /// AutoPkg preferences file
    pub prefs: Option<PathBuf>,

    /// Directories searched for recipes
    pub search_dirs: Option<Vec<PathBuf>>,

    /// Directory searched first (recipe overrides)
    pub overrides_dir: Option<PathBuf>,

    /// Recursion depth for recipe search (default: 3)
    pub max_search_depth: Option<usize>,
}

impl AutopkgConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dirs) = &self.search_dirs {
            if dirs.iter().any(|d| d.as_os_str().is_empty()) {
                return Err(ConfigError::InvalidValue(
                    "search_dirs cannot contain empty paths".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Pull request settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PullRequestConfig {
    /// Open pull requests at all (default: true)
    pub enabled: Option<bool>,

    /// Hosting CLI executable (default: "gh")
    pub cli: Option<PathBuf>,

    /// Environment variable holding `owner/repo` (default: "GITHUB_REPOSITORY")
    pub repo_env: Option<String>,

    /// Base branch (default: the repository's default branch)
    pub base: Option<String>,

    /// Open as draft
    pub draft: Option<bool>,

    /// Labels to apply
    pub labels: Option<Vec<String>>,
}

impl PullRequestConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(var) = &self.repo_env {
            if var.is_empty() || var.contains('=') {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid repo_env variable name '{}'",
                    var
                )));
            }
        }
        if let Some(labels) = &self.labels {
            if labels.iter().any(|l| l.trim().is_empty()) {
                return Err(ConfigError::InvalidValue(
                    "labels cannot be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}
