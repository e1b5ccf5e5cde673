//! Timer-driven cancellation.

use std::time::Duration;
use stepchain_core::CancellationToken;
use tokio::task::JoinHandle;
use tracing::info;

/// Cancels `token` with `reason` once `delay` has elapsed.
///
/// Chains have no built-in timeout; this is the external trigger for one.
/// The task resolves to `true` if it was the call that cancelled the token,
/// and can be aborted to disarm the deadline. Must be called from within a
/// tokio runtime.
pub fn cancel_after(
    token: &CancellationToken,
    delay: Duration,
    reason: impl Into<String>,
) -> JoinHandle<bool> {
    let token = token.clone();
    let reason = reason.into();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let cancelled = token.cancel_with_reason(reason.clone());
        if cancelled {
            info!("Deadline of {:?} elapsed, cancelled: {}", delay, reason);
        }
        cancelled
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fires() {
        let token = CancellationToken::new();
        let deadline = cancel_after(&token, Duration::from_secs(5), "deadline");

        assert!(deadline.await.expect("timer task"));
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("deadline"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_loses_to_earlier_cancel() {
        let token = CancellationToken::new();
        token.cancel_with_reason("manual");
        let deadline = cancel_after(&token, Duration::from_millis(10), "deadline");

        assert!(!deadline.await.expect("timer task"));
        assert_eq!(token.reason().as_deref(), Some("manual"));
    }
}
