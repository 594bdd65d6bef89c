//! core
//!
//! Core domain types and inputs for autopkg-prs.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, RecipeName, RunStamp
//! - [`naming`] - Branch and workspace naming for one attempt
//! - [`config`] - Configuration schema, loading, and resolved settings
//! - [`recipe_list`] - The JSON recipe list
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid branch and recipe names
//! - Configuration is strict and resolved once into immutable settings

pub mod config;
pub mod naming;
pub mod recipe_list;
pub mod types;
