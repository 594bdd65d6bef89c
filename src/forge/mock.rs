//! forge::mock
//!
//! Mock publisher for deterministic testing.
//!
//! # Design
//!
//! The mock stores created PRs in memory, records every request and can be
//! told to fail, optionally only for heads containing a substring.
//!
//! # Example
//!
//! ```
//! use autopkg_prs::forge::mock::MockForge;
//! use autopkg_prs::forge::{CreatePrRequest, PullRequestPublisher};
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//!
//! let pr = forge
//!     .create_pr(CreatePrRequest::for_recipe("autopkg/Foo-20240101000000", "Foo"))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(pr.number, Some(1));
//! assert_eq!(forge.requests()[0].title, "AutoPkg update: Foo");
//! # });
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use super::traits::{CreatePrRequest, ForgeError, PullRequest, PullRequestPublisher};

/// Mock publisher for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone)]
pub struct MockForge {
    /// Internal state shared across clones.
    inner: Arc<Mutex<MockForgeInner>>,
}

/// Internal mutable state.
#[derive(Debug)]
struct MockForgeInner {
    /// Created PRs, in creation order.
    prs: Vec<PullRequest>,
    /// Next PR number to assign.
    next_pr_number: u64,
    /// Failure to inject.
    fail_on: Option<FailOn>,
    /// Every request received, including failed ones.
    requests: Vec<CreatePrRequest>,
    /// Never answer `create_pr`.
    hang: bool,
}

/// Configuration for injected failures.
#[derive(Debug, Clone)]
pub struct FailOn {
    /// Error to return.
    pub error: ForgeError,
    /// Only fail heads containing this substring (all heads if `None`).
    pub head_contains: Option<String>,
}

impl MockForge {
    /// Create a new empty mock forge.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockForgeInner {
                prs: Vec::new(),
                next_pr_number: 1,
                fail_on: None,
                requests: Vec::new(),
                hang: false,
            })),
        }
    }

    /// Fail every `create_pr` with `error`.
    pub fn failing(error: ForgeError) -> Self {
        Self::new().fail_on(FailOn {
            error,
            head_contains: None,
        })
    }

    /// Record every `create_pr` but never complete it.
    pub fn hanging() -> Self {
        let forge = Self::new();
        forge.inner.lock().unwrap_or_else(PoisonError::into_inner).hang = true;
        forge
    }

    /// Configure the mock to fail.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.fail_on = Some(fail_on);
        }
        self
    }

    /// All requests received.
    pub fn requests(&self) -> Vec<CreatePrRequest> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.requests.clone()
    }

    /// All PRs created (for test verification).
    pub fn all_prs(&self) -> Vec<PullRequest> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.prs.clone()
    }

    /// Get the count of PRs.
    pub fn pr_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.prs.len()
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PullRequestPublisher for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let hang = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.requests.push(request.clone());
            inner.hang
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(fail) = &inner.fail_on {
            let applies = fail
                .head_contains
                .as_deref()
                .map_or(true, |s| request.head.contains(s));
            if applies {
                return Err(fail.error.clone());
            }
        }

        let number = inner.next_pr_number;
        inner.next_pr_number += 1;

        let pr = PullRequest {
            url: format!("https://github.com/mock/repo/pull/{}", number),
            number: Some(number),
            head: request.head,
        };
        inner.prs.push(pr.clone());
        Ok(pr)
    }
}
