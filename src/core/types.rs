//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`RecipeName`] - Recipe identifier derived from a recipe file name
//! - [`RunStamp`] - UTC instant an attempt was started, truncated to seconds
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so a branch computed from a recipe name is always
//! something `git branch` will accept.
//!
//! # Examples
//!
//! ```
//! use autopkg_prs::core::types::{BranchName, RecipeName};
//! use std::path::Path;
//!
//! let recipe = RecipeName::from_path(Path::new("recipes/Firefox.munki.recipe")).unwrap();
//! assert_eq!(recipe.as_str(), "Firefox.munki");
//!
//! let branch = BranchName::new("autopkg/Firefox.munki-20240102030405").unwrap();
//! assert_eq!(branch.as_str(), "autopkg/Firefox.munki-20240102030405");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! ```

use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid recipe name: {0}")]
    InvalidRecipeName(String),
}

/// File suffixes that mark a recipe definition.
///
/// Ordered longest first so `Foo.recipe.yaml` strips to `Foo`, not `Foo.recipe`.
pub const RECIPE_SUFFIXES: [&str; 3] = [".recipe.yaml", ".recipe.plist", ".recipe"];

/// A validated Git branch name.
///
/// Branch names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - Cannot be exactly `@`
///
/// # Example
///
/// ```
/// use autopkg_prs::core::types::BranchName;
///
/// let name = BranchName::new("autopkg/Foo-20240101000000").unwrap();
/// assert_eq!(name.as_str(), "autopkg/Foo-20240101000000");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new(".hidden").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// assert!(BranchName::new("@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }

        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }

        if name.starts_with('.') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '.'".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }

        if name.ends_with(".lock") {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot end with '.lock'".into(),
            ));
        }
        if name.ends_with('/') || name.ends_with('.') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot end with '/' or '.'".into(),
            ));
        }

        for forbidden in ["..", "@{", "//"] {
            if name.contains(forbidden) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{forbidden}'"
                )));
            }
        }

        if let Some(c) = name.chars().find(|c| is_forbidden_ref_char(*c)) {
            return Err(TypeError::InvalidBranchName(format!(
                "branch name cannot contain {c:?}"
            )));
        }

        for component in name.split('/') {
            if component.starts_with('.') {
                return Err(TypeError::InvalidBranchName(
                    "path component cannot start with '.'".into(),
                ));
            }
            if component.ends_with(".lock") {
                return Err(TypeError::InvalidBranchName(
                    "path component cannot end with '.lock'".into(),
                ));
            }
        }

        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Characters git never accepts anywhere in a refname.
fn is_forbidden_ref_char(c: char) -> bool {
    c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '\\' | '?' | '*' | '[')
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The logical identifier of a recipe for the duration of one run.
///
/// Derived from the recipe file's base name with its recipe suffix removed.
/// Characters that git forbids in a refname are replaced with `-`, so the
/// name can be embedded directly into a branch and a directory name.
///
/// # Example
///
/// ```
/// use autopkg_prs::core::types::RecipeName;
/// use std::path::Path;
///
/// let name = RecipeName::from_path(Path::new("Google Chrome.pkg.recipe.yaml")).unwrap();
/// assert_eq!(name.as_str(), "Google-Chrome.pkg");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecipeName(String);

impl RecipeName {
    /// Create a recipe name, sanitising characters that cannot appear in a branch.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRecipeName` if nothing usable remains.
    pub fn new(name: impl AsRef<str>) -> Result<Self, TypeError> {
        let sanitized: String = name
            .as_ref()
            .trim()
            .chars()
            .map(|c| {
                if is_forbidden_ref_char(c) || c == '/' || c == '@' {
                    '-'
                } else {
                    c
                }
            })
            .collect();

        // Leading dots/dashes and trailing dots would make an invalid ref component
        let mut sanitized = sanitized
            .trim_start_matches(['.', '-'])
            .trim_end_matches('.')
            .to_string();
        while sanitized.contains("..") {
            sanitized = sanitized.replace("..", ".");
        }

        if sanitized.is_empty() {
            return Err(TypeError::InvalidRecipeName(format!(
                "'{}' has no usable characters",
                name.as_ref()
            )));
        }
        if sanitized.ends_with(".lock") {
            return Err(TypeError::InvalidRecipeName(format!(
                "'{}' cannot end with '.lock'",
                name.as_ref()
            )));
        }

        Ok(Self(sanitized))
    }

    /// Derive the recipe name from a recipe file path.
    ///
    /// Known recipe suffixes are stripped; any other file uses its stem.
    pub fn from_path(path: &Path) -> Result<Self, TypeError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TypeError::InvalidRecipeName(format!("{} has no file name", path.display()))
            })?;

        let base = RECIPE_SUFFIXES
            .iter()
            .find_map(|suffix| file_name.strip_suffix(suffix))
            .filter(|b| !b.is_empty())
            .or_else(|| path.file_stem().and_then(|s| s.to_str()))
            .unwrap_or(file_name);

        Self::new(base)
    }

    /// Get the recipe name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RecipeName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RecipeName> for String {
    fn from(name: RecipeName) -> Self {
        name.0
    }
}

impl std::fmt::Display for RecipeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The UTC instant a recipe attempt started.
///
/// Stored truncated to whole seconds; both the compact form used in branch
/// and directory names and the ISO-8601 form used in commit messages are
/// derived from the same instant.
///
/// # Example
///
/// ```
/// use autopkg_prs::core::types::RunStamp;
/// use chrono::{TimeZone, Utc};
///
/// let stamp = RunStamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
/// assert_eq!(stamp.compact(), "20240102030405");
/// assert_eq!(stamp.iso8601(), "2024-01-02T03:04:05+00:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunStamp(DateTime<Utc>);

impl RunStamp {
    /// Capture the current time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Create from an existing datetime, dropping sub-second precision.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(0))
    }

    /// `YYYYmmddHHMMSS`, used in branch and workspace names.
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d%H%M%S").to_string()
    }

    /// ISO-8601 with an explicit `+00:00` offset, truncated to seconds.
    pub fn iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl std::fmt::Display for RunStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.iso8601())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod branch_name {
        use super::*;

        #[test]
        fn valid_branch_names() {
            assert!(BranchName::new("main").is_ok());
            assert!(BranchName::new("autopkg/Foo-20240101000000").is_ok());
            assert!(BranchName::new("autopkg/Firefox.munki-20240101000000").is_ok());
            assert!(BranchName::new("user@feature").is_ok());
        }

        #[test]
        fn empty_name_rejected() {
            assert!(BranchName::new("").is_err());
        }

        #[test]
        fn leading_dot_or_dash_rejected() {
            assert!(BranchName::new(".hidden").is_err());
            assert!(BranchName::new("-flag").is_err());
            assert!(BranchName::new("autopkg/.hidden").is_err());
        }

        #[test]
        fn lock_suffix_rejected() {
            assert!(BranchName::new("branch.lock").is_err());
            assert!(BranchName::new("branch.lock/child").is_err());
        }

        #[test]
        fn forbidden_sequences_rejected() {
            assert!(BranchName::new("a..b").is_err());
            assert!(BranchName::new("a@{b").is_err());
            assert!(BranchName::new("a//b").is_err());
            assert!(BranchName::new("trailing/").is_err());
            assert!(BranchName::new("@").is_err());
        }

        #[test]
        fn special_chars_rejected() {
            for c in [' ', '~', '^', ':', '\\', '?', '*', '[', '\t'] {
                let name = format!("bad{c}name");
                assert!(BranchName::new(&name).is_err(), "{name:?} should be rejected");
            }
        }

        #[test]
        fn serde_roundtrip() {
            let name = BranchName::new("autopkg/Foo-1").unwrap();
            let json = serde_json::to_string(&name).unwrap();
            assert_eq!(json, "\"autopkg/Foo-1\"");
            let parsed: BranchName = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, name);

            let invalid: Result<BranchName, _> = serde_json::from_str("\"bad..name\"");
            assert!(invalid.is_err());
        }
    }

    mod recipe_name {
        use super::*;
        use std::path::PathBuf;

        #[test]
        fn strips_recipe_suffixes() {
            let cases = [
                ("Foo.recipe", "Foo"),
                ("Foo.recipe.yaml", "Foo"),
                ("Foo.recipe.plist", "Foo"),
                ("Firefox.munki.recipe", "Firefox.munki"),
                ("dir/Bar.download.recipe.yaml", "Bar.download"),
            ];
            for (path, expected) in cases {
                let name = RecipeName::from_path(&PathBuf::from(path)).unwrap();
                assert_eq!(name.as_str(), expected, "for {path}");
            }
        }

        #[test]
        fn other_files_use_stem() {
            let name = RecipeName::from_path(Path::new("Foo.json")).unwrap();
            assert_eq!(name.as_str(), "Foo");
            let name = RecipeName::from_path(Path::new("Baz")).unwrap();
            assert_eq!(name.as_str(), "Baz");
        }

        #[test]
        fn sanitizes_ref_unsafe_characters() {
            assert_eq!(RecipeName::new("Google Chrome").unwrap().as_str(), "Google-Chrome");
            assert_eq!(RecipeName::new("a:b?c").unwrap().as_str(), "a-b-c");
            assert_eq!(RecipeName::new("..hidden").unwrap().as_str(), "hidden");
            assert_eq!(RecipeName::new("a..b").unwrap().as_str(), "a.b");
        }

        #[test]
        fn empty_rejected() {
            assert!(RecipeName::new("").is_err());
            assert!(RecipeName::new("...").is_err());
            assert!(RecipeName::new("x.lock").is_err());
        }
    }

    mod run_stamp {
        use super::*;
        use chrono::TimeZone;

        #[test]
        fn truncates_subseconds() {
            let dt = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
                + chrono::Duration::milliseconds(750);
            let stamp = RunStamp::from_datetime(dt);
            assert_eq!(stamp.iso8601(), "2024-05-06T07:08:09+00:00");
            assert_eq!(stamp.compact(), "20240506070809");
        }

        #[test]
        fn display_is_iso() {
            let stamp = RunStamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
            assert_eq!(format!("{stamp}"), "2024-01-01T00:00:00+00:00");
        }
    }
}
