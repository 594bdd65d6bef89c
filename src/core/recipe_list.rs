//! core::recipe_list
//!
//! The recipe list input file.
//!
//! The file is a JSON array of strings, each a logical recipe name or a path
//! to a recipe file, processed in the order given:
//!
//! ```json
//! ["Firefox.munki", "GoogleChrome.munki", "recipes/Custom.munki.recipe.yaml"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from reading the recipe list.
#[derive(Debug, Error)]
pub enum RecipeListError {
    #[error("failed to read recipe list '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse recipe list '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("recipe list '{path}' has a blank entry at index {index}")]
    BlankEntry { path: PathBuf, index: usize },
}

/// Load the ordered list of recipe references from `path`.
///
/// # Errors
///
/// A missing, unreadable, or malformed file is an error; so is a blank entry.
/// An empty array is valid and yields an empty list.
pub fn load(path: &Path) -> Result<Vec<String>, RecipeListError> {
    let contents = fs::read_to_string(path).map_err(|e| RecipeListError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let entries: Vec<String> =
        serde_json::from_str(&contents).map_err(|e| RecipeListError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

    if let Some(index) = entries.iter().position(|e| e.trim().is_empty()) {
        return Err(RecipeListError::BlankEntry {
            path: path.to_path_buf(),
            index,
        });
    }

    Ok(entries.into_iter().map(|e| e.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("recipe_list.json");
        fs::write(&path, r#"["Foo", " Bar ", "dir/Baz.recipe"]"#).unwrap();

        let list = load(&path).unwrap();
        assert_eq!(list, vec!["Foo", "Bar", "dir/Baz.recipe"]);
    }

    #[test]
    fn empty_array_is_valid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("recipe_list.json");
        fs::write(&path, "[]").unwrap();
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let err = load(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, RecipeListError::ReadError { .. }));
    }

    #[test]
    fn wrong_shape_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("recipe_list.json");
        fs::write(&path, r#"{"recipes": ["Foo"]}"#).unwrap();
        assert!(matches!(
            load(&path).unwrap_err(),
            RecipeListError::ParseError { .. }
        ));
    }

    #[test]
    fn blank_entry_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("recipe_list.json");
        fs::write(&path, r#"["Foo", "  "]"#).unwrap();
        assert!(matches!(
            load(&path).unwrap_err(),
            RecipeListError::BlankEntry { index: 1, .. }
        ));
    }
}
