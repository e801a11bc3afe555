//! Cancellation token checked between units.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A token for coarse, cooperative cancellation of a batch.
///
/// The driver checks it before starting each unit; a command that is
/// already running is never interrupted. Only the first reason is kept.
#[derive(Debug, Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Later calls keep the first reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        token.cancel("interrupted");
        token.cancel("second request");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("interrupted".to_string()));
    }

    #[test]
    fn test_token_shared_across_threads() {
        let token = Arc::new(CancellationToken::new());
        let remote = Arc::clone(&token);

        std::thread::spawn(move || remote.cancel("signal"))
            .join()
            .unwrap();

        assert!(token.is_cancelled());
    }
}
