//! State shared by every node of one chain run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stepchain_core::{CancellationToken, ChainError, ChainState, Lane};
use tracing::{info, warn};

/// Observer of step failures.
pub(crate) type ErrorHandler = Arc<dyn Fn(&ChainError) + Send + Sync + 'static>;

/// Observer of the terminal chain state.
pub(crate) type FinallyHandler = Arc<dyn Fn(ChainState) + Send + Sync + 'static>;

struct Shared {
    token: CancellationToken,
    on_error: Option<ErrorHandler>,
    finally: Option<FinallyHandler>,
    finished: AtomicBool,
}

/// Token, default lane and handlers of a started chain.
///
/// Fixed when the chain starts; nodes only read it. The `finished` flag makes
/// the terminal notification fire once. Scopes derived for spliced chains
/// swap the default lane but share everything else with their parent.
pub(crate) struct RunScope {
    shared: Arc<Shared>,
    default_lane: Arc<dyn Lane>,
}

impl RunScope {
    pub(crate) fn new(
        token: CancellationToken,
        default_lane: Arc<dyn Lane>,
        on_error: Option<ErrorHandler>,
        finally: Option<FinallyHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                token,
                on_error,
                finally,
                finished: AtomicBool::new(false),
            }),
            default_lane,
        }
    }

    /// Same run, different default lane.
    pub(crate) fn with_default_lane(&self, default_lane: Arc<dyn Lane>) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::clone(&self.shared),
            default_lane,
        })
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    pub(crate) fn default_lane(&self) -> &Arc<dyn Lane> {
        &self.default_lane
    }

    /// Reports a failure: error handler first, then finally with `Errored`.
    pub(crate) fn fail(&self, error: ChainError) {
        if !self.claim() {
            warn!("Chain already finished; dropping late error: {}", error);
            return;
        }
        if let Some(handler) = &self.shared.on_error {
            handler(&error);
        }
        self.deliver(ChainState::Errored(error));
    }

    /// Ends the run with `state`. Cancellation never reaches the error handler.
    pub(crate) fn finish(&self, state: ChainState) {
        if !self.claim() {
            warn!("Chain already finished; dropping late state: {}", state);
            return;
        }
        self.deliver(state);
    }

    fn claim(&self) -> bool {
        !self.shared.finished.swap(true, Ordering::SeqCst)
    }

    fn deliver(&self, state: ChainState) {
        info!("Chain finished: {}", state);
        if let Some(finally) = &self.shared.finally {
            finally(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use crate::lane::{InlineLane, TokioLane};
    use stepchain_core::StepName;

    #[test]
    fn test_fail_calls_error_handler_then_finally_once() {
        let errors = Arc::new(AtomicUsize::new(0));
        let finals = Arc::new(AtomicUsize::new(0));
        let errors_seen = errors.clone();
        let finals_seen = finals.clone();
        let on_error: ErrorHandler = Arc::new(move |_: &ChainError| {
            errors_seen.fetch_add(1, Ordering::SeqCst);
        });
        let finally: FinallyHandler = Arc::new(move |state: ChainState| {
            assert!(state.is_errored());
            finals_seen.fetch_add(1, Ordering::SeqCst);
        });

        let scope = RunScope::new(
            CancellationToken::new(),
            Arc::new(InlineLane),
            Some(on_error),
            Some(finally),
        );
        scope.fail(ChainError::step_failed(StepName::new("a"), "boom"));
        scope.fail(ChainError::step_failed(StepName::new("b"), "again"));
        scope.finish(ChainState::Resolved);

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(finals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancellation_skips_error_handler() {
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_seen = errors.clone();
        let on_error: ErrorHandler = Arc::new(move |_: &ChainError| {
            errors_seen.fetch_add(1, Ordering::SeqCst);
        });

        let token = CancellationToken::new();
        token.cancel();
        let scope = RunScope::new(token.clone(), Arc::new(InlineLane), Some(on_error), None);
        scope.finish(ChainState::Canceled(token));

        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_derived_scope_shares_run() {
        let finals = Arc::new(AtomicUsize::new(0));
        let finals_seen = finals.clone();
        let finally: FinallyHandler = Arc::new(move |_: ChainState| {
            finals_seen.fetch_add(1, Ordering::SeqCst);
        });

        let token = CancellationToken::new();
        let scope = RunScope::new(token.clone(), Arc::new(InlineLane), None, Some(finally));
        let derived = scope.with_default_lane(Arc::new(TokioLane::ambient().named("derived")));

        assert_eq!(derived.default_lane().name(), "derived");
        assert_eq!(scope.default_lane().name(), "inline");
        assert!(derived.token().ptr_eq(&token));

        derived.finish(ChainState::Resolved);
        scope.finish(ChainState::Resolved);
        assert_eq!(finals.load(Ordering::SeqCst), 1);
    }
}
