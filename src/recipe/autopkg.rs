//! recipe::autopkg
//!
//! Runs recipes with the `autopkg` command-line tool and reads its report.
//!
//! # Report format
//!
//! `autopkg run --report-plist <file>` writes a property list:
//!
//! ```text
//! failures: [ { message, recipe, traceback } ]
//! summary_results:
//!   munki_importer_summary_result:
//!     data_rows: [ { name, version, icon_repo_path, pkginfo_path, pkg_repo_path, catalogs } ]
//! ```
//!
//! The importer reports paths relative to the `icons/`, `pkgsinfo/` and
//! `pkgs/` subdirectories; [`ImportedItem`] paths are relative to the munki
//! repository root, so the subdirectory is prepended when missing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{ImportedItem, RecipeError, RecipeRequest, RecipeResult, RecipeRunner};
use crate::core::config::Settings;
use crate::process::Invocation;

#[derive(Debug, Default, Deserialize)]
struct RunReport {
    #[serde(default)]
    failures: Vec<ReportFailure>,
    #[serde(default)]
    summary_results: SummaryResults,
}

#[derive(Debug, Default, Deserialize)]
struct ReportFailure {
    #[serde(default)]
    message: String,
    #[serde(default)]
    recipe: String,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryResults {
    #[serde(default)]
    munki_importer_summary_result: Option<ImporterSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct ImporterSummary {
    #[serde(default)]
    data_rows: Vec<ImportedRow>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportedRow {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    icon_repo_path: Option<String>,
    #[serde(default)]
    pkginfo_path: Option<String>,
    #[serde(default)]
    pkg_repo_path: Option<String>,
}

impl ImportedRow {
    fn into_item(self) -> ImportedItem {
        ImportedItem {
            name: self.name,
            version: self.version,
            icon_path: repo_relative("icons", self.icon_repo_path),
            pkginfo_path: repo_relative("pkgsinfo", self.pkginfo_path),
            pkg_path: repo_relative("pkgs", self.pkg_repo_path),
        }
    }
}

fn repo_relative(subdir: &str, path: Option<String>) -> Option<PathBuf> {
    let path = path?;
    let trimmed = path.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let p = PathBuf::from(trimmed);
    if p.starts_with(subdir) {
        Some(p)
    } else {
        Some(Path::new(subdir).join(p))
    }
}

impl RunReport {
    fn parse(bytes: &[u8]) -> Result<Self, plist::Error> {
        plist::from_bytes(bytes)
    }

    fn failure_messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| {
                if f.recipe.is_empty() {
                    f.message.trim().to_string()
                } else {
                    format!("{}: {}", f.recipe, f.message.trim())
                }
            })
            .collect()
    }

    fn into_items(self) -> Vec<ImportedItem> {
        self.summary_results
            .munki_importer_summary_result
            .map(|s| s.data_rows.into_iter().map(ImportedRow::into_item).collect())
            .unwrap_or_default()
    }
}

/// [`RecipeRunner`] backed by the `autopkg` executable.
#[derive(Debug, Clone)]
pub struct AutopkgRunner {
    binary: PathBuf,
    prefs: Option<PathBuf>,
    report_dir: PathBuf,
    /// Munki repo, relative to the workspace
    munki_repo: PathBuf,
    verbosity: u8,
}

impl AutopkgRunner {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.autopkg.binary.clone(),
            prefs: settings.autopkg.prefs.clone(),
            report_dir: settings.report_dir.clone(),
            munki_repo: settings.munki_repo.clone(),
            verbosity: settings.verbosity,
        }
    }

    /// Where the report for `request` is written.
    pub fn report_path(&self, request: &RecipeRequest) -> PathBuf {
        self.report_dir
            .join(format!("{}-{}.plist", request.name, request.stamp.compact()))
    }

    /// The `autopkg run` invocation for `request`.
    pub fn invocation(&self, request: &RecipeRequest) -> Invocation {
        let munki_repo = if self.munki_repo.is_absolute() {
            self.munki_repo.clone()
        } else {
            request.workspace.join(&self.munki_repo)
        };

        let mut cmd = Invocation::new(&self.binary).arg("run");
        if self.verbosity > 0 {
            cmd = cmd.arg(format!("-{}", "v".repeat(usize::from(self.verbosity))));
        }
        cmd = cmd
            .arg(&request.path)
            .arg("--report-plist")
            .arg(self.report_path(request))
            .arg("--key")
            .arg(format!("MUNKI_REPO={}", munki_repo.display()));
        if let Some(prefs) = &self.prefs {
            cmd = cmd.arg("--prefs").arg(prefs);
        }
        cmd.current_dir(&request.workspace)
    }
}

#[async_trait]
impl RecipeRunner for AutopkgRunner {
    async fn run(&self, request: &RecipeRequest) -> Result<RecipeResult, RecipeError> {
        tokio::fs::create_dir_all(&self.report_dir)
            .await
            .map_err(|e| RecipeError::Report {
                path: self.report_dir.clone(),
                message: e.to_string(),
            })?;

        let report_path = self.report_path(request);
        let output = self.invocation(request).run().await?;

        tracing::debug!(
            recipe = %request.name,
            code = ?output.code,
            "autopkg finished"
        );

        let bytes = match tokio::fs::read(&report_path).await {
            Ok(b) => Some(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(RecipeError::Report {
                    path: report_path,
                    message: e.to_string(),
                })
            }
        };

        let Some(bytes) = bytes else {
            if output.success() {
                return Ok(RecipeResult::unreported());
            }
            return Err(RecipeError::Failed {
                recipe: request.name.to_string(),
                messages: vec![last_line(&output.stderr)],
            });
        };

        let report = RunReport::parse(&bytes).map_err(|e| RecipeError::Report {
            path: report_path.clone(),
            message: e.to_string(),
        })?;

        let mut messages = report.failure_messages();
        if messages.is_empty() && !output.success() {
            messages.push(last_line(&output.stderr));
        }
        if !messages.is_empty() {
            return Err(RecipeError::Failed {
                recipe: request.name.to_string(),
                messages,
            });
        }

        Ok(RecipeResult {
            imported: Some(report.into_items()),
            report: Some(report_path),
        })
    }
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("autopkg exited unsuccessfully")
        .to_string()
}
