//! One-shot cancellation shared by every step of a chain.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: bool,
    reason: Option<String>,
}

/// One-shot, thread-safe cancel flag with an optional reason.
///
/// Clones share the same flag. Once cancelled a token stays cancelled, and
/// only the first `cancel` call records a reason.
///
/// Cancellation is cooperative: it stops steps that have not started yet but
/// never interrupts a step body that is already running.
///
/// # Examples
///
/// ```
/// use stepchain_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let shared = token.clone();
///
/// assert!(shared.cancel_with_reason("user aborted"));
/// assert!(!token.cancel_with_reason("too late"));
///
/// assert!(token.is_cancelled());
/// assert_eq!(token.reason().as_deref(), Some("user aborted"));
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<RwLock<TokenState>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels without a reason.
    ///
    /// Returns `true` on the first call and `false` afterwards.
    pub fn cancel(&self) -> bool {
        self.transition(None)
    }

    /// Cancels and records `reason`.
    ///
    /// Returns `true` on the first call. Later calls return `false` and leave
    /// the recorded reason untouched.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) -> bool {
        self.transition(Some(reason.into()))
    }

    fn transition(&self, reason: Option<String>) -> bool {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if state.cancelled {
            return false;
        }
        state.cancelled = true;
        state.reason = reason;
        true
    }

    /// Returns `true` once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled
    }

    /// Reason recorded by the cancelling call, if one was given.
    pub fn reason(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .reason
            .clone()
    }

    /// Returns `true` if both handles refer to the same token.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CancellationToken")
            .field("cancelled", &state.cancelled)
            .field("reason", &state.reason)
            .finish()
    }
}
