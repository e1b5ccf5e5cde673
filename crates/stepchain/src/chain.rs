//! Chain builder and runner.

use crate::handle::StepHandle;
use crate::lane::default_lane;
use crate::node::{Entry, Link, Splice, StepNode, Tail};
use crate::scope::{ErrorHandler, FinallyHandler, RunScope};
use crate::snapshot::ChainSnapshot;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use stepchain_core::{
    CancellationToken, ChainError, ChainState, Lane, Step, StepConfig, StepName,
};
use tracing::{debug, info, warn};

// Orders handler attachments across chains so that composing two chains
// keeps whichever handler was attached last.
static NEXT_ATTACHMENT: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct Attached<H> {
    seq: u64,
    handler: H,
}

impl<H> Attached<H> {
    fn new(handler: H) -> Self {
        Self {
            seq: NEXT_ATTACHMENT.fetch_add(1, Ordering::Relaxed),
            handler,
        }
    }

    fn latest(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (Some(a), Some(b)) => Some(if b.seq > a.seq { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Clone, Default)]
struct Hooks {
    on_error: Option<Attached<ErrorHandler>>,
    finally: Option<Attached<FinallyHandler>>,
}

impl Hooks {
    fn absorb(&mut self, other: Hooks) {
        self.on_error = Attached::latest(self.on_error.take(), other.on_error);
        self.finally = Attached::latest(self.finally.take(), other.finally);
    }

    fn is_empty(&self) -> bool {
        self.on_error.is_none() && self.finally.is_none()
    }
}

/// A linear chain of steps from input `I` to output `O`.
///
/// Chains are built by value: every `then*` call consumes the chain and
/// returns a longer one, so a step can never be linked twice. The chain
/// keeps its first and last node; intermediate output types are erased.
///
/// Every node shares the chain's [`CancellationToken`]. The chain has one
/// error slot and one finally slot; setting either again replaces the
/// previous handler, wherever in the chain it was attached.
///
/// # Examples
///
/// ```
/// use stepchain::prelude::*;
/// use std::sync::{Arc, Mutex};
///
/// let result = Arc::new(Mutex::new(None));
/// let seen = result.clone();
///
/// let chain = StepChain::new(|h: StepHandle<i32, i32>| {
///     h.resolve(h.input() + 1);
/// })
/// .then(|h| {
///     h.resolve(h.input() * 10);
/// })
/// .then(move |h| {
///     *seen.lock().unwrap() = Some(*h.input());
///     h.resolve(());
/// })
/// .with_default_lane(Arc::new(InlineLane))
/// .finally(|state| assert!(state.is_resolved()));
///
/// chain.start(1).expect("first start");
/// assert_eq!(*result.lock().unwrap(), Some(20));
/// assert!(matches!(chain.start(1), Err(ChainError::AlreadyStarted)));
/// ```
pub struct StepChain<I, O> {
    first: Arc<dyn Entry<I>>,
    last: Arc<dyn Tail<O>>,
    step_count: usize,
    token: CancellationToken,
    default_lane: Option<Arc<dyn Lane>>,
    hooks: Hooks,
    started: AtomicBool,
}

impl<I, O> fmt::Debug for StepChain<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepChain")
            .field("step_count", &self.step_count)
            .field("token", &self.token)
            .field(
                "default_lane",
                &self.default_lane.as_deref().map(|lane| lane.name()),
            )
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl<I: Send + 'static, O: Send + 'static> From<StepNode<I, O>> for StepChain<I, O> {
    fn from(node: StepNode<I, O>) -> Self {
        let node = Arc::new(node);
        let first: Arc<dyn Entry<I>> = node.clone();
        Self {
            first,
            last: node,
            step_count: 1,
            token: CancellationToken::new(),
            default_lane: None,
            hooks: Hooks::default(),
            started: AtomicBool::new(false),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> StepChain<I, O> {
    /// Creates a single-step chain.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(StepHandle<I, O>) + Send + 'static,
    {
        Self::from(StepNode::new(body))
    }

    /// Creates a single named step.
    pub fn named<F>(name: impl Into<StepName>, body: F) -> Self
    where
        F: FnOnce(StepHandle<I, O>) + Send + 'static,
    {
        Self::from(StepNode::new(body).with_name(name))
    }

    /// Creates a single-step chain from an async [`Step`].
    pub fn from_async<S>(step: S) -> Self
    where
        S: Step<I, O> + 'static,
    {
        Self::from(StepNode::from_async(step))
    }

    /// Appends a step running on the chain's default lane.
    pub fn then<N, F>(self, body: F) -> StepChain<I, N>
    where
        N: Send + 'static,
        F: FnOnce(StepHandle<O, N>) + Send + 'static,
    {
        self.then_step(StepNode::new(body))
    }

    /// Appends a named step running on the chain's default lane.
    pub fn then_named<N, F>(self, name: impl Into<StepName>, body: F) -> StepChain<I, N>
    where
        N: Send + 'static,
        F: FnOnce(StepHandle<O, N>) + Send + 'static,
    {
        self.then_step(StepNode::new(body).with_name(name))
    }

    /// Appends a step running on `lane`.
    pub fn then_on<N, F>(self, lane: Arc<dyn Lane>, body: F) -> StepChain<I, N>
    where
        N: Send + 'static,
        F: FnOnce(StepHandle<O, N>) + Send + 'static,
    {
        self.then_step(StepNode::new(body).with_lane(lane))
    }

    /// Appends a step configured by `config`.
    pub fn then_configured<N, F>(self, config: StepConfig, body: F) -> StepChain<I, N>
    where
        N: Send + 'static,
        F: FnOnce(StepHandle<O, N>) + Send + 'static,
    {
        self.then_step(StepNode::new(body).with_config(config))
    }

    /// Appends an async [`Step`].
    pub fn then_async<N, S>(self, step: S) -> StepChain<I, N>
    where
        N: Send + 'static,
        S: Step<O, N> + 'static,
    {
        self.then_step(StepNode::from_async(step))
    }

    /// Appends a pre-built node.
    pub fn then_step<N>(self, node: StepNode<O, N>) -> StepChain<I, N>
    where
        N: Send + 'static,
    {
        let node = Arc::new(node);
        if self.is_started() {
            warn!(
                "Step '{}' appended to a chain that already started; the step will never run",
                node.name()
            );
        } else {
            self.last.link(node.clone());
        }
        StepChain {
            first: self.first,
            last: node,
            step_count: self.step_count + 1,
            token: self.token,
            default_lane: self.default_lane,
            hooks: self.hooks,
            started: self.started,
        }
    }

    /// Appends every step of `other` after this chain's last step.
    ///
    /// The combined chain keeps this chain's cancellation token, and its
    /// default lane when it has one. For each handler slot, whichever of the
    /// two chains attached its handler last wins.
    pub fn then_chain<N>(mut self, other: StepChain<O, N>) -> StepChain<I, N>
    where
        N: Send + 'static,
    {
        let started = self.is_started() || other.is_started();
        if started {
            warn!("Appending chains where one already started; the appended steps will never run");
        } else {
            self.last.link(Arc::clone(&other.first));
            self.hooks.absorb(other.hooks);
        }
        StepChain {
            first: self.first,
            last: other.last,
            step_count: self.step_count + other.step_count,
            token: self.token,
            default_lane: self.default_lane.or(other.default_lane),
            hooks: self.hooks,
            started: AtomicBool::new(started),
        }
    }

    /// Sets the chain's error handler, replacing any earlier one.
    ///
    /// Called once with the error of the first failing step. Cancellation
    /// does not count as a failure and never reaches this handler.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ChainError) + Send + Sync + 'static,
    {
        self.warn_if_started("on_error");
        let handler: ErrorHandler = Arc::new(handler);
        self.hooks.on_error = Some(Attached::new(handler));
        self
    }

    /// Sets the chain's finally handler, replacing any earlier one.
    ///
    /// Only the last attached handler runs, once, after the chain's true last
    /// step reaches a terminal state, even if an earlier handler was attached
    /// before more steps were appended.
    pub fn finally<F>(mut self, handler: F) -> Self
    where
        F: Fn(ChainState) + Send + Sync + 'static,
    {
        self.warn_if_started("finally");
        let handler: FinallyHandler = Arc::new(handler);
        self.hooks.finally = Some(Attached::new(handler));
        self
    }

    /// Starts the chain with `input` and returns without waiting.
    ///
    /// A chain runs at most once: calling `start` again returns
    /// [`ChainError::AlreadyStarted`] and runs nothing.
    pub fn start(&self, input: I) -> Result<(), ChainError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Chain was started more than once; rejecting");
            return Err(ChainError::AlreadyStarted);
        }
        let run = Arc::new(RunScope::new(
            self.token.clone(),
            self.run_lane(),
            self.hooks.on_error.as_ref().map(|a| Arc::clone(&a.handler)),
            self.hooks.finally.as_ref().map(|a| Arc::clone(&a.handler)),
        ));
        info!("Starting chain of {} step(s)", self.step_count);
        Arc::clone(&self.first).start(input, run);
        Ok(())
    }

    /// The token shared by every step of the chain.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of statically linked steps.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Returns `true` once `start` has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Names of the statically linked steps, in order.
    pub fn step_names(&self) -> Vec<StepName> {
        self.snapshot().steps.into_iter().map(|s| s.name).collect()
    }

    /// Current state of the chain and each of its steps.
    pub fn snapshot(&self) -> ChainSnapshot {
        let default_lane = self.run_lane();
        let mut steps = Vec::with_capacity(self.step_count);
        let mut cursor = Some(Arc::clone(&self.first).into_link());
        while let Some(link) = cursor {
            steps.push(link.snapshot(default_lane.name()));
            cursor = link.next_link();
        }
        ChainSnapshot {
            started: self.is_started(),
            cancelled: self.token.is_cancelled(),
            cancel_reason: self.token.reason(),
            steps,
        }
    }

    /// Sets the lane used by steps that were not given their own.
    ///
    /// Without one, such steps run on the ambient tokio runtime.
    pub fn with_default_lane(mut self, lane: Arc<dyn Lane>) -> Self {
        self.default_lane = Some(lane);
        self
    }

    fn run_lane(&self) -> Arc<dyn Lane> {
        self.default_lane.clone().unwrap_or_else(default_lane)
    }

    /// Consumes the chain for splicing into a running chain.
    pub(crate) fn into_splice(self) -> Result<Splice<I>, ChainError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ChainError::AlreadyStarted);
        }
        if !self.hooks.is_empty() {
            debug!("Spliced chain's own handlers are replaced by the running chain's");
        }
        Ok(Splice {
            entry: self.first,
            default_lane: self.default_lane,
        })
    }

    fn warn_if_started(&self, slot: &str) {
        if self.is_started() {
            warn!(
                "Setting '{}' on a chain that already started has no effect on the current run",
                slot
            );
        }
    }
}
