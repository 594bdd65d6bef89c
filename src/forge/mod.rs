//! forge
//!
//! Opening pull requests on the hosting service.
//!
//! # Architecture
//!
//! The [`PullRequestPublisher`] trait is the engine's only view of the
//! hosting service. It is invoked after a branch has been pushed, and its
//! failures never compromise what is already on the remote.
//!
//! # Modules
//!
//! - `traits`: [`PullRequestPublisher`] and request/response types
//! - `gh`: [`GhCli`], shells out to `gh pr create`
//! - [`mock`]: mock implementation for deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use autopkg_prs::core::config::Settings;
//! use autopkg_prs::forge::{CreatePrRequest, GhCli, PullRequestPublisher};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::default();
//! let gh = GhCli::from_settings(&settings.pull_request);
//!
//! let pr = gh
//!     .create_pr(CreatePrRequest::for_recipe("autopkg/Firefox-20240101120000", "Firefox"))
//!     .await?;
//! println!("Opened {}", pr.url);
//! # Ok::<(), autopkg_prs::forge::ForgeError>(())
//! # });
//! ```

mod gh;
pub mod mock;
mod traits;

pub use gh::GhCli;
pub use traits::*;
