//! engine::cancel
//!
//! Run-wide cancellation.
//!
//! A single [`CancelHandle`] broadcasts to every attempt's [`CancelToken`]
//! through a `watch` channel. Attempts race their work against
//! [`CancelToken::cancelled`] but never their workspace teardown.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sending side: fires cancellation once.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

/// Receiving side, cloned into each attempt.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

/// Create a connected handle and token.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation has been requested.
    ///
    /// If the handle is dropped without cancelling, never resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancel on Ctrl-C, or when `timeout` elapses.
pub fn cancel_on_shutdown(handle: CancelHandle, timeout: Option<Duration>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        let interrupted = async {
            // Without a signal handler only the timeout can cancel
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = interrupted => {
                tracing::warn!("Interrupted; cancelling in-flight recipes");
            }
            _ = deadline => {
                tracing::warn!("Run timeout reached; cancelling in-flight recipes");
            }
        }
        handle.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_all_tokens() {
        let (handle, token) = cancellation();
        let mut a = token.clone();
        let mut b = token;
        assert!(!a.is_cancelled());

        handle.cancel();
        a.cancelled().await;
        b.cancelled().await;
        assert!(a.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (handle, mut token) = cancellation();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn never_token() {
        let mut token = CancelToken::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn timeout_cancels() {
        let (handle, mut token) = cancellation();
        let _watcher = cancel_on_shutdown(handle, Some(Duration::from_millis(10)));
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
    }
}
