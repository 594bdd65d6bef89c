//! recipe::finder
//!
//! Filesystem search for recipe files.
//!
//! A logical name such as `Firefox.munki` is looked up as
//! `Firefox.munki.recipe`, `Firefox.munki.recipe.plist` and
//! `Firefox.munki.recipe.yaml`, first in the overrides directory and then
//! in each search directory. Each directory is checked directly before it
//! is walked recursively, so a top-level override always wins over a
//! nested copy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::traits::{RecipeError, RecipeFinder};
use crate::core::config::Settings;
use crate::core::types::RECIPE_SUFFIXES;

/// Finds recipes under a fixed list of directories.
#[derive(Debug, Clone)]
pub struct DirRecipeFinder {
    /// Base for relative recipe paths in the recipe list
    root: PathBuf,
    /// Directories in search order (overrides first)
    dirs: Vec<PathBuf>,
    max_depth: usize,
}

impl DirRecipeFinder {
    pub fn new(root: impl Into<PathBuf>, dirs: Vec<PathBuf>, max_depth: usize) -> Self {
        Self {
            root: root.into(),
            dirs,
            max_depth,
        }
    }

    /// Search order taken from the autopkg settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut dirs = vec![settings.autopkg.overrides_dir.clone()];
        dirs.extend(settings.autopkg.search_dirs.iter().cloned());
        Self::new(
            settings.repo_root.clone(),
            dirs,
            settings.autopkg.max_search_depth,
        )
    }

    /// Directories searched, in order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Blocking lookup.
    pub fn find_blocking(&self, name: &str) -> Option<PathBuf> {
        let as_path = Path::new(name);
        let direct = if as_path.is_absolute() {
            as_path.to_path_buf()
        } else {
            self.root.join(as_path)
        };
        if direct.is_file() {
            return Some(direct);
        }

        let candidates = candidate_names(name);

        for dir in self.dirs.iter().filter(|d| d.is_dir()) {
            if let Some(found) = candidates.iter().map(|c| dir.join(c)).find(|p| p.is_file()) {
                return Some(found);
            }

            let nested = WalkDir::new(dir)
                .min_depth(2)
                .max_depth(self.max_depth)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .find(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|f| candidates.iter().any(|c| c == f))
                });
            if let Some(entry) = nested {
                return Some(entry.into_path());
            }
        }
        None
    }
}

/// File names that satisfy a lookup for `name`.
fn candidate_names(name: &str) -> Vec<String> {
    if RECIPE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return vec![name.to_string()];
    }
    [".recipe", ".recipe.plist", ".recipe.yaml"]
        .iter()
        .map(|suffix| format!("{}{}", name, suffix))
        .collect()
}

#[async_trait]
impl RecipeFinder for DirRecipeFinder {
    async fn find_recipe(&self, name: &str) -> Result<PathBuf, RecipeError> {
        let finder = self.clone();
        let lookup = name.to_string();
        let found = tokio::task::spawn_blocking(move || finder.find_blocking(&lookup))
            .await
            .map_err(|e| RecipeError::Internal(e.to_string()))?;

        found.ok_or_else(|| RecipeError::NotFound {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn finder(root: &Path) -> DirRecipeFinder {
        DirRecipeFinder::new(
            root,
            vec![
                root.join("AutoPkg/RecipeOverrides"),
                root.join("AutoPkg/Recipes"),
                root.join("AutoPkg/RecipeRepos"),
            ],
            3,
        )
    }

    #[test]
    fn candidates_for_bare_name() {
        assert_eq!(
            candidate_names("Foo.munki"),
            vec!["Foo.munki.recipe", "Foo.munki.recipe.plist", "Foo.munki.recipe.yaml"]
        );
    }

    #[test]
    fn candidates_for_suffixed_name() {
        assert_eq!(candidate_names("Foo.recipe.yaml"), vec!["Foo.recipe.yaml"]);
    }

    #[tokio::test]
    async fn existing_path_returned_as_is() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("AutoPkg/Recipes/Foo.recipe");
        touch(&path);

        let found = finder(temp.path())
            .find_recipe("AutoPkg/Recipes/Foo.recipe")
            .await
            .unwrap();
        assert_eq!(found, path);
    }

    #[tokio::test]
    async fn override_wins_over_search_dir() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("AutoPkg/Recipes/Foo.munki.recipe"));
        let override_path = temp.path().join("AutoPkg/RecipeOverrides/Foo.munki.recipe");
        touch(&override_path);

        let found = finder(temp.path()).find_recipe("Foo.munki").await.unwrap();
        assert_eq!(found, override_path);
    }

    #[tokio::test]
    async fn nested_recipe_found() {
        let temp = TempDir::new().unwrap();
        let nested = temp
            .path()
            .join("AutoPkg/RecipeRepos/com.github.autopkg.recipes/Mozilla/Firefox.munki.recipe.yaml");
        touch(&nested);

        let found = finder(temp.path()).find_recipe("Firefox.munki").await.unwrap();
        assert_eq!(found, nested);
    }

    #[tokio::test]
    async fn too_deep_is_not_found() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("AutoPkg/Recipes/a/b/c/d/Deep.recipe"));

        let err = finder(temp.path()).find_recipe("Deep").await.unwrap_err();
        assert!(matches!(err, RecipeError::NotFound { name } if name == "Deep"));
    }

    #[tokio::test]
    async fn missing_dirs_are_skipped() {
        let temp = TempDir::new().unwrap();
        let err = finder(temp.path()).find_recipe("Nothing").await.unwrap_err();
        assert!(matches!(err, RecipeError::NotFound { .. }));
    }
}
