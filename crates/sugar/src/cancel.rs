//! Hierarchical, advisory cancellation.
//!
//! A token is cancelled when it or any ancestor is cancelled. Nothing in the
//! core interrupts a foreign call; callers poll between operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
}

/// Shareable cancellation flag with an optional parent.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<TokenState>);

impl CancelToken {
    /// A root token that is never cancelled by anyone else.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// A token cancelled together with `self`, but cancellable on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        CancelToken(Arc::new(TokenState {
            cancelled: AtomicBool::new(false),
            parent: Some(self.clone()),
        }))
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.0.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.0
            .parent
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_sees_parent_cancel() {
        let root = CancelToken::new();
        let child = root.child();
        assert!(!child.is_cancelled());
        root.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let root = CancelToken::new();
        let child = root.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }
}
