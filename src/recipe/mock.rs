//! recipe::mock
//!
//! Recording finder and runner for engine tests.
//!
//! [`MockRunner`] writes the files a real import would produce into the
//! attempt's workspace, so status-based change detection and staging see
//! genuine changes.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    ImportedItem, RecipeError, RecipeFinder, RecipeRequest, RecipeResult, RecipeRunner,
};

/// Finder that knows a fixed set of names.
#[derive(Debug, Clone, Default)]
pub struct MockFinder {
    recipes: Arc<Mutex<HashMap<String, PathBuf>>>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl MockFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` to `/recipes/<name>.recipe`.
    pub fn with_recipe(self, name: &str) -> Self {
        let path = PathBuf::from(format!("/recipes/{}.recipe", name));
        self.with_path(name, path)
    }

    /// Resolve `name` to `path`.
    pub fn with_path(self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.recipes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), path.into());
        self
    }

    /// Names looked up so far.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl RecipeFinder for MockFinder {
    async fn find_recipe(&self, name: &str) -> Result<PathBuf, RecipeError> {
        self.lookups.lock().unwrap_or_else(PoisonError::into_inner).push(name.to_string());
        self.recipes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RecipeError::NotFound {
                name: name.to_string(),
            })
    }
}

/// What a mocked recipe does.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Import these items (files are written under the munki repo).
    Import(Vec<ImportedItem>),
    /// Write these workspace-relative files but produce no report.
    Unreported(Vec<PathBuf>),
    /// Fail with this message.
    Fail(String),
    /// Never finish (until cancelled).
    Hang,
}

#[derive(Debug, Default)]
struct MockRunnerInner {
    behaviors: HashMap<String, MockBehavior>,
    requests: Vec<RecipeRequest>,
}

/// Runner whose behavior is scripted per recipe name.
///
/// Recipes without a script import nothing.
#[derive(Debug, Clone)]
pub struct MockRunner {
    munki_repo: PathBuf,
    delay: Option<Duration>,
    inner: Arc<Mutex<MockRunnerInner>>,
}

impl MockRunner {
    /// A runner writing imports under `<workspace>/<munki_repo>`.
    pub fn new(munki_repo: impl Into<PathBuf>) -> Self {
        Self {
            munki_repo: munki_repo.into(),
            delay: None,
            inner: Arc::new(Mutex::new(MockRunnerInner::default())),
        }
    }

    /// Script `recipe`.
    pub fn on(self, recipe: &str, behavior: MockBehavior) -> Self {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .behaviors
            .insert(recipe.to_string(), behavior);
        self
    }

    /// Sleep before every run, to force attempts to overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecipeRequest> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).requests.clone()
    }
}

/// An item with the usual icon and pkginfo paths for `name`.
pub fn item(name: &str) -> ImportedItem {
    ImportedItem {
        name: name.to_string(),
        version: "1.0".to_string(),
        icon_path: Some(PathBuf::from(format!("icons/{}.png", name.to_lowercase()))),
        pkginfo_path: Some(PathBuf::from(format!(
            "pkgsinfo/{}.plist",
            name.to_lowercase()
        ))),
        pkg_path: None,
    }
}

fn write_file(path: PathBuf) -> Result<(), RecipeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RecipeError::Internal(e.to_string()))?;
    }
    fs::write(&path, b"mock").map_err(|e| RecipeError::Internal(e.to_string()))
}

#[async_trait]
impl RecipeRunner for MockRunner {
    async fn run(&self, request: &RecipeRequest) -> Result<RecipeResult, RecipeError> {
        let behavior = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.requests.push(request.clone());
            inner.behaviors.get(request.name.as_str()).cloned()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            None => Ok(RecipeResult::with_items(Vec::new())),
            Some(MockBehavior::Import(items)) => {
                let munki = request.workspace.join(&self.munki_repo);
                for item in &items {
                    for path in item.changed_paths() {
                        write_file(munki.join(path))?;
                    }
                }
                Ok(RecipeResult::with_items(items))
            }
            Some(MockBehavior::Unreported(files)) => {
                for f in files {
                    write_file(request.workspace.join(f))?;
                }
                Ok(RecipeResult::unreported())
            }
            Some(MockBehavior::Fail(message)) => Err(RecipeError::Failed {
                recipe: request.name.to_string(),
                messages: vec![message],
            }),
            Some(MockBehavior::Hang) => {
                std::future::pending::<()>().await;
                Ok(RecipeResult::unreported())
            }
        }
    }
}
