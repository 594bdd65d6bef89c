//! autopkg-prs - Run AutoPkg recipes and turn each update into a pull request
//!
//! Every recipe in the list runs in its own branch and git worktree, created
//! off the current branch of the base checkout. When a recipe imports a new
//! package the change is committed, pushed, and a pull request is opened; the
//! worktree is removed afterwards whatever happened. Recipes run
//! concurrently and a failure in one never affects the others.
//!
//! # Architecture
//!
//! - [`cli`] - Argument parsing, setup, and command dispatch
//! - [`engine`] - Orchestrator and the per-recipe pipeline
//! - [`core`] - Strong types, naming rules, configuration, the recipe list
//! - [`git`] - The `VersionControl` contract and its git implementation
//! - [`recipe`] - Finding recipe files and running them through `autopkg`
//! - [`forge`] - Opening pull requests through the `gh` CLI
//! - [`process`] - Async subprocess invocation
//! - [`ui`] - Logging setup and plain output
//!
//! # Invariants
//!
//! 1. The base checkout is never modified; all work happens in worktrees
//! 2. Every worktree an attempt creates is removed before the attempt reports
//! 3. Nothing is committed or pushed without detected changes
//! 4. A pull request failure never undoes a push

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod git;
pub mod process;
pub mod recipe;
pub mod ui;
