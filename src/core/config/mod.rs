//! core::config
//!
//! Configuration schema, loading, and the resolved run settings.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. The first config file found (see below)
//! 3. CLI flags (applied by the CLI layer onto [`Settings`])
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `--config <path>` (must exist)
//! 2. `$AUTOPKG_PRS_CONFIG` if set
//! 3. `<repo>/.autopkg-prs.toml`
//! 4. `$XDG_CONFIG_HOME/autopkg-prs/config.toml`
//! 5. `~/.autopkg-prs/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use autopkg_prs::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(None, Path::new("/ci/repo")).unwrap();
//! let settings = result.config.resolve(Path::new("/ci/repo"));
//! println!("Remote: {}", settings.git.remote);
//! ```

pub mod schema;

pub use schema::{AutopkgConfig, ChangeDetection, FileConfig, GitConfig, PullRequestConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::naming::{Naming, DEFAULT_BRANCH_NAMESPACE, DEFAULT_WORKTREE_PREFIX};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "AUTOPKG_PRS_CONFIG";

/// Config file name looked up at the repository root.
pub const REPO_CONFIG_FILE: &str = ".autopkg-prs.toml";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Parsed configuration file plus where it came from.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// File contents (all defaults if no file was found)
    pub file: FileConfig,
    /// Path of the loaded file
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// `explicit` is the `--config` flag; when given, the file must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed,
    /// or validated. Missing default-location files are not an error.
    pub fn load(explicit: Option<&Path>, repo_root: &Path) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let path = match explicit {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => return Err(ConfigError::NotFound(path.to_path_buf())),
            None => Self::discover(repo_root, &mut warnings),
        };

        let file = match &path {
            Some(p) => Self::read_file(p)?,
            None => FileConfig::default(),
        };
        file.validate()?;

        Ok(ConfigLoadResult {
            config: Config {
                file,
                loaded_from: path,
            },
            warnings,
        })
    }

    /// Find the first config file in the default locations.
    fn discover(repo_root: &Path, warnings: &mut Vec<ConfigWarning>) -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            warnings.push(ConfigWarning {
                message: format!("${} points at a missing file, ignoring it", CONFIG_ENV),
                path,
            });
        }

        let repo_file = repo_root.join(REPO_CONFIG_FILE);
        if repo_file.exists() {
            return Some(repo_file);
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("autopkg-prs/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".autopkg-prs/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the path to the loaded config file.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    /// Apply defaults and produce the settings for a run rooted at `repo_root`.
    ///
    /// Paths that locate inputs and outputs of the run are resolved against
    /// `repo_root`. The munki repo and stage root stay relative: they are
    /// interpreted inside each attempt's workspace.
    pub fn resolve(&self, repo_root: &Path) -> Settings {
        let f = &self.file;
        let git = f.git.clone().unwrap_or_default();
        let autopkg = f.autopkg.clone().unwrap_or_default();
        let pr = f.pull_request.clone().unwrap_or_default();
        let at_root = |p: PathBuf| if p.is_absolute() { p } else { repo_root.join(p) };

        let munki_repo = f.munki_repo.clone().unwrap_or_else(|| PathBuf::from("Munki"));
        let log_file = match &f.log_file {
            Some(p) if p.as_os_str().is_empty() => None,
            Some(p) => Some(at_root(p.clone())),
            None => Some(at_root(PathBuf::from("autopkg_runner.log"))),
        };

        let search_dirs = autopkg.search_dirs.unwrap_or_else(|| {
            vec![
                PathBuf::from("AutoPkg/Recipes"),
                PathBuf::from("AutoPkg/RecipeRepos"),
            ]
        });

        Settings {
            repo_root: repo_root.to_path_buf(),
            recipe_list: at_root(
                f.recipe_list
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("AutoPkg/recipe_list.json")),
            ),
            report_dir: at_root(
                f.report_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("AutoPkg/Reports")),
            ),
            log_file,
            verbosity: f.verbosity.unwrap_or(0),
            cache_plugin: f.cache_plugin.clone().unwrap_or_else(|| "json".to_string()),
            cache_file: at_root(
                f.cache_file
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("metadata_cache.json")),
            ),
            max_concurrency: f.max_concurrency,
            run_timeout: f.run_timeout_secs.map(Duration::from_secs),
            git: GitSettings {
                binary: git.binary.unwrap_or_else(|| PathBuf::from("git")),
                remote: git.remote.unwrap_or_else(|| "origin".to_string()),
                naming: Naming::new(
                    git.branch_namespace
                        .unwrap_or_else(|| DEFAULT_BRANCH_NAMESPACE.to_string()),
                    git.worktree_prefix
                        .unwrap_or_else(|| DEFAULT_WORKTREE_PREFIX.to_string()),
                ),
                change_detection: git.change_detection.unwrap_or_default(),
                stage_root: git.stage_root.unwrap_or_else(|| munki_repo.clone()),
            },
            autopkg: AutopkgSettings {
                binary: autopkg.binary.unwrap_or_else(|| PathBuf::from("autopkg")),
                prefs: autopkg.prefs.map(at_root),
                search_dirs: search_dirs.into_iter().map(at_root).collect(),
                overrides_dir: at_root(
                    autopkg
                        .overrides_dir
                        .unwrap_or_else(|| PathBuf::from("AutoPkg/RecipeOverrides")),
                ),
                max_search_depth: autopkg.max_search_depth.unwrap_or(3),
            },
            pull_request: PullRequestSettings {
                enabled: pr.enabled.unwrap_or(true),
                cli: pr.cli.unwrap_or_else(|| PathBuf::from("gh")),
                repo_env: pr
                    .repo_env
                    .unwrap_or_else(|| "GITHUB_REPOSITORY".to_string()),
                base: pr.base,
                draft: pr.draft.unwrap_or(false),
                labels: pr.labels.unwrap_or_default(),
            },
            munki_repo,
        }
    }
}

/// Fully resolved settings for one run.
///
/// Built once before any attempt starts and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base repository checkout
    pub repo_root: PathBuf,
    /// JSON recipe list
    pub recipe_list: PathBuf,
    /// Directory for recipe run reports
    pub report_dir: PathBuf,
    /// Log file, if file logging is enabled
    pub log_file: Option<PathBuf>,
    /// Verbosity level
    pub verbosity: u8,
    /// Metadata cache backend
    pub cache_plugin: String,
    /// Metadata cache location
    pub cache_file: PathBuf,
    /// Munki repository, relative to a workspace root
    pub munki_repo: PathBuf,
    /// Upper bound on attempts inside the pipeline at once
    pub max_concurrency: Option<usize>,
    /// Cancel the run after this long
    pub run_timeout: Option<Duration>,
    /// Version control settings
    pub git: GitSettings,
    /// Recipe engine settings
    pub autopkg: AutopkgSettings,
    /// Pull request settings
    pub pull_request: PullRequestSettings,
}

/// Resolved version control settings.
#[derive(Debug, Clone)]
pub struct GitSettings {
    pub binary: PathBuf,
    pub remote: String,
    pub naming: Naming,
    pub change_detection: ChangeDetection,
    /// Relative to a workspace root
    pub stage_root: PathBuf,
}

/// Resolved recipe engine settings.
#[derive(Debug, Clone)]
pub struct AutopkgSettings {
    pub binary: PathBuf,
    pub prefs: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
    pub overrides_dir: PathBuf,
    pub max_search_depth: usize,
}

/// Resolved pull request settings.
#[derive(Debug, Clone)]
pub struct PullRequestSettings {
    pub enabled: bool,
    pub cli: PathBuf,
    pub repo_env: String,
    pub base: Option<String>,
    pub draft: bool,
    pub labels: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Config::default().resolve(Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_resolve_against_repo_root() {
        let settings = Config::default().resolve(Path::new("/ci/repo"));

        assert_eq!(
            settings.recipe_list,
            PathBuf::from("/ci/repo/AutoPkg/recipe_list.json")
        );
        assert_eq!(settings.report_dir, PathBuf::from("/ci/repo/AutoPkg/Reports"));
        assert_eq!(
            settings.log_file,
            Some(PathBuf::from("/ci/repo/autopkg_runner.log"))
        );
        assert_eq!(settings.cache_plugin, "json");
        assert_eq!(settings.munki_repo, PathBuf::from("Munki"));
        assert_eq!(settings.git.remote, "origin");
        assert_eq!(settings.git.naming.namespace(), "autopkg");
        assert_eq!(settings.git.change_detection, ChangeDetection::Report);
        assert_eq!(settings.git.stage_root, PathBuf::from("Munki"));
        assert_eq!(settings.autopkg.max_search_depth, 3);
        assert!(settings.pull_request.enabled);
        assert_eq!(settings.pull_request.repo_env, "GITHUB_REPOSITORY");
        assert!(settings.max_concurrency.is_none());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(
            &path,
            r#"
            munki_repo = "repo/munki"
            log_file = ""
            max_concurrency = 2

            [git]
            remote = "upstream"
            change_detection = "status"

            [pull_request]
            draft = true
            labels = ["autopkg"]
            "#,
        )
        .unwrap();

        let result = Config::load(Some(&path), temp.path()).unwrap();
        assert_eq!(result.config.loaded_from(), Some(path.as_path()));

        let settings = result.config.resolve(temp.path());
        assert_eq!(settings.munki_repo, PathBuf::from("repo/munki"));
        assert_eq!(settings.git.stage_root, PathBuf::from("repo/munki"));
        assert!(settings.log_file.is_none());
        assert_eq!(settings.max_concurrency, Some(2));
        assert_eq!(settings.git.remote, "upstream");
        assert_eq!(settings.git.change_detection, ChangeDetection::Status);
        assert!(settings.pull_request.draft);
        assert_eq!(settings.pull_request.labels, vec!["autopkg"]);
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(Some(&temp.path().join("nope.toml")), temp.path());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn repo_file_is_discovered() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(REPO_CONFIG_FILE), "verbosity = 2").unwrap();

        // An explicit env override would win; make sure it points nowhere useful
        std::env::remove_var(CONFIG_ENV);

        let result = Config::load(None, temp.path()).unwrap();
        assert_eq!(result.config.file.verbosity, Some(2));
    }

    #[test]
    fn invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "cache_plugin = \"redis\"").unwrap();
        assert!(matches!(
            Config::load(Some(&path), temp.path()),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "recipe_lists = \"typo.json\"").unwrap();
        assert!(matches!(
            Config::load(Some(&path), temp.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn absolute_paths_kept() {
        let config = Config {
            file: FileConfig {
                report_dir: Some(PathBuf::from("/var/reports")),
                ..Default::default()
            },
            loaded_from: None,
        };
        let settings = config.resolve(Path::new("/ci/repo"));
        assert_eq!(settings.report_dir, PathBuf::from("/var/reports"));
    }
}
