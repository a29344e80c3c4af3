//! Cooperative cancellation
//!
//! A [`CancelToken`] is handed to every long-running call. It is only checked at
//! image boundaries and when a dispatcher future resolves; an HTTP call already
//! in flight always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the running state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let a = CancelToken::new();
        let b = a.clone();
        a.cancel();
        assert!(b.is_cancelled());
        // Idempotent
        b.cancel();
        assert!(a.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move { trigger.cancel() }).await.unwrap();
        assert!(token.is_cancelled());
    }
}
