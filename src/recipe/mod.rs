//! recipe
//!
//! Locating recipe files and running them.
//!
//! # Modules
//!
//! - `traits`: [`RecipeFinder`], [`RecipeRunner`] and the result types
//! - `finder`: [`DirRecipeFinder`], directory search with overrides first
//! - `autopkg`: [`AutopkgRunner`], shells out to `autopkg run` and parses the report
//! - [`mock`]: scripted implementations for deterministic testing

mod autopkg;
mod finder;
pub mod mock;
mod traits;

pub use autopkg::AutopkgRunner;
pub use finder::DirRecipeFinder;
pub use traits::*;
