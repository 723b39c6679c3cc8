//! Connection lifecycle token
//!
//! Closing a connection cancels its token with a [`CloseCause`]. The token is
//! advisory: a task already blocked in a socket read is released by the
//! socket closing, not by the token.

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why a connection was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// Caller closed the connection
    Local,
    /// Handshake failed and the connection was torn down
    HandshakeFailed(String),
    /// Parent token was cancelled
    ParentCancelled,
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCause::Local => f.write_str("closed locally"),
            CloseCause::HandshakeFailed(reason) => write!(f, "handshake failed: {reason}"),
            CloseCause::ParentCancelled => f.write_str("parent cancelled"),
        }
    }
}

/// Cancellation handle plus the first recorded close cause
#[derive(Debug, Clone)]
pub struct Lifecycle {
    token: CancellationToken,
    cause: Arc<OnceCell<CloseCause>>,
}

impl Lifecycle {
    /// Standalone lifecycle
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: Arc::new(OnceCell::new()),
        }
    }

    /// Lifecycle cancelled whenever `parent` is
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            cause: Arc::new(OnceCell::new()),
        }
    }

    /// Cancel with `cause`; returns false if already cancelled
    pub fn cancel(&self, cause: CloseCause) -> bool {
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    /// Whether the lifecycle has ended, locally or through its parent
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Recorded close cause
    pub fn cause(&self) -> Option<CloseCause> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        self.token
            .is_cancelled()
            .then_some(CloseCause::ParentCancelled)
    }

    /// Token observers can await
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolve once cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cause_wins() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.is_cancelled());
        assert_eq!(lifecycle.cause(), None);

        assert!(lifecycle.cancel(CloseCause::Local));
        assert!(!lifecycle.cancel(CloseCause::HandshakeFailed("x".into())));
        assert!(lifecycle.is_cancelled());
        assert_eq!(lifecycle.cause(), Some(CloseCause::Local));
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let lifecycle = Lifecycle::child_of(&parent);
        parent.cancel();
        assert!(lifecycle.is_cancelled());
        assert_eq!(lifecycle.cause(), Some(CloseCause::ParentCancelled));
    }

    #[tokio::test]
    async fn test_cancelled_resolves() {
        let lifecycle = Lifecycle::new();
        let observer = lifecycle.clone();
        let waiter = tokio::spawn(async move { observer.cancelled().await });
        lifecycle.cancel(CloseCause::Local);
        waiter.await.unwrap();
    }
}
