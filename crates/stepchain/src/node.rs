//! Step nodes: the scheduling unit of a chain.

use crate::handle::{Completer, Completion, StepHandle};
use crate::scope::RunScope;
use crate::snapshot::StepSnapshot;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stepchain_core::{
    CancellationToken, ChainError, ChainState, Lane, NodeState, Step, StepConfig, StepName, Work,
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Locks a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Body<I, O> = Box<dyn FnOnce(StepHandle<I, O>) + Send + 'static>;
type CancelHook = Box<dyn FnOnce(&StepName, &CancellationToken) + Send + 'static>;

/// Type-erased view of a node, used to walk a chain without recursion.
pub(crate) trait Link: Send + Sync {
    fn snapshot(&self, default_lane: &str) -> StepSnapshot;

    fn next_link(&self) -> Option<Arc<dyn Link>>;

    fn take_next_link(&self) -> Option<Arc<dyn Link>>;
}

/// A node that can be started with an input of type `I`.
pub(crate) trait Entry<I>: Link {
    fn start(self: Arc<Self>, input: I, run: Arc<RunScope>);

    fn into_link(self: Arc<Self>) -> Arc<dyn Link>;
}

/// A node whose output of type `O` can feed a next node.
pub(crate) trait Tail<O>: Send + Sync {
    fn link(&self, next: Arc<dyn Entry<O>>);
}

/// A chain handed to a running chain as its continuation.
pub(crate) struct Splice<I> {
    pub(crate) entry: Arc<dyn Entry<I>>,
    pub(crate) default_lane: Option<Arc<dyn Lane>>,
}

/// One step of a chain.
///
/// A node owns its body, an optional lane and the link to the next node.
/// Without a lane it runs on its chain's default lane. Its body runs at most
/// once: the first `start` takes it, later starts are ignored.
///
/// # Examples
///
/// ```
/// use stepchain::prelude::*;
/// use std::sync::Arc;
///
/// let step = StepNode::new(|handle: StepHandle<u32, u32>| {
///     handle.resolve(handle.input() * 10);
/// })
/// .with_name("scale")
/// .with_lane(Arc::new(InlineLane));
///
/// assert_eq!(step.name().as_str(), "scale");
/// assert_eq!(step.lane_name(), Some("inline"));
/// ```
pub struct StepNode<I, O> {
    name: StepName,
    lane: Option<Arc<dyn Lane>>,
    body: Mutex<Option<Body<I, O>>>,
    on_cancel: Mutex<Option<CancelHook>>,
    next: Mutex<Option<Arc<dyn Entry<O>>>>,
    state: Mutex<NodeState>,
}

impl<I, O> fmt::Debug for StepNode<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepNode")
            .field("name", &self.name)
            .field("lane", &self.lane_name())
            .field("state", &*lock(&self.state))
            .finish()
    }
}

impl<I, O> Drop for StepNode<I, O> {
    fn drop(&mut self) {
        // Unlink successors one at a time so long chains do not recurse.
        let mut next = self
            .next
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|next| next.into_link());
        while let Some(link) = next {
            if Arc::strong_count(&link) > 1 {
                break;
            }
            next = link.take_next_link();
        }
    }
}

impl<I, O> StepNode<I, O> {
    /// The step name.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Name of the node's own lane, if it has one.
    pub fn lane_name(&self) -> Option<&str> {
        self.lane.as_deref().map(|lane| lane.name())
    }

    /// Current scheduling state.
    pub fn state(&self) -> NodeState {
        *lock(&self.state)
    }

    fn set_state(&self, state: NodeState) {
        *lock(&self.state) = state;
    }
}

impl<I: Send + 'static, O: Send + 'static> StepNode<I, O> {
    /// Creates a node with a generated name and no lane of its own.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce(StepHandle<I, O>) + Send + 'static,
    {
        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            name: StepName::generated(id),
            lane: None,
            body: Mutex::new(Some(Box::new(body))),
            on_cancel: Mutex::new(None),
            next: Mutex::new(None),
            state: Mutex::new(NodeState::Pending),
        }
    }

    /// Creates a node that runs an async [`Step`] on the ambient tokio runtime.
    ///
    /// `Ok` resolves the node and `Err` fails it. The node fails if its lane
    /// runs the body outside a tokio runtime.
    pub fn from_async<S>(step: S) -> Self
    where
        S: Step<I, O> + 'static,
    {
        let name = step.name();
        Self::new(move |handle: StepHandle<I, O>| {
            let (input, done) = handle.into_parts();
            match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        match step.execute(input).await {
                            Ok(output) => done.resolve(output),
                            Err(error) => done.fail(error),
                        };
                    });
                }
                Err(error) => {
                    done.fail(error);
                }
            }
        })
        .with_name(name)
    }

    /// Sets the step name.
    pub fn with_name(mut self, name: impl Into<StepName>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the lane the body is submitted to.
    pub fn with_lane(mut self, lane: Arc<dyn Lane>) -> Self {
        self.lane = Some(lane);
        self
    }

    /// Applies the name and lane set in `config`; unset fields keep their
    /// current values.
    pub fn with_config(mut self, config: StepConfig) -> Self {
        if let Some(name) = config.name {
            self.name = name;
        }
        if config.lane.is_some() {
            self.lane = config.lane;
        }
        self
    }

    /// Registers a hook run when cancellation stops this step before its
    /// body starts.
    pub fn on_cancel<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&StepName, &CancellationToken) + Send + 'static,
    {
        self.on_cancel = Mutex::new(Some(Box::new(hook)));
        self
    }

    fn lane_for(&self, run: &RunScope) -> Arc<dyn Lane> {
        match &self.lane {
            Some(lane) => Arc::clone(lane),
            None => Arc::clone(run.default_lane()),
        }
    }

    fn execute(self: Arc<Self>, body: Body<I, O>, input: I, run: Arc<RunScope>, lane: &str) {
        // Cancellation may have arrived while the work sat in the lane.
        if run.token().is_cancelled() {
            self.cancel(&run);
            return;
        }

        self.set_state(NodeState::Running);
        debug!("Step '{}' running on lane '{}'", self.name, lane);

        let node = Arc::clone(&self);
        let completer = Completer::new(
            self.name.clone(),
            Box::new(move |completion: Completion<O>| node.complete(completion, run)),
        );
        body(StepHandle::new(input, completer));
    }

    fn complete(&self, completion: Completion<O>, run: Arc<RunScope>) {
        match completion {
            Completion::Resolved(output) => {
                self.set_state(NodeState::Resolved);
                info!("Step '{}' completed successfully", self.name);
                let next = lock(&self.next).clone();
                match next {
                    Some(next) => next.start(output, run),
                    None => run.finish(ChainState::Resolved),
                }
            }
            Completion::Spliced(output, splice) => {
                self.set_state(NodeState::Resolved);
                info!(
                    "Step '{}' completed successfully, continuing with spliced chain",
                    self.name
                );
                let run = match splice.default_lane {
                    Some(lane) => run.with_default_lane(lane),
                    None => run,
                };
                splice.entry.start(output, run);
            }
            Completion::Failed(error) => {
                self.set_state(NodeState::Errored);
                let error = ChainError::step_failed(self.name.clone(), error);
                warn!("Step '{}' failed: {}", self.name, error);
                run.fail(error);
            }
        }
    }

    fn cancel(&self, run: &RunScope) {
        self.set_state(NodeState::Canceled);
        let token = run.token();
        match token.reason() {
            Some(reason) => info!("Step '{}' canceled before start: {}", self.name, reason),
            None => info!("Step '{}' canceled before start", self.name),
        }
        let hook = lock(&self.on_cancel).take();
        if let Some(hook) = hook {
            hook(&self.name, token);
        }
        run.finish(ChainState::Canceled(token.clone()));
    }
}

impl<I: Send + 'static, O: Send + 'static> Entry<I> for StepNode<I, O> {
    fn start(self: Arc<Self>, input: I, run: Arc<RunScope>) {
        let body = lock(&self.body).take();
        let Some(body) = body else {
            warn!(
                "Step '{}' was started again while {}; ignoring",
                self.name,
                self.state()
            );
            return;
        };

        if run.token().is_cancelled() {
            self.cancel(&run);
            return;
        }

        let lane = self.lane_for(&run);
        debug!("Step '{}' dispatched to lane '{}'", self.name, lane.name());
        let node = Arc::clone(&self);
        let scope = Arc::clone(&run);
        let lane_name = lane.name().to_string();
        let work: Work = Box::new(move || node.execute(body, input, scope, &lane_name));
        if let Err(reason) = lane.submit(work) {
            self.set_state(NodeState::Errored);
            let error = ChainError::LaneRejected {
                step_name: self.name.clone(),
                reason,
            };
            warn!("{}", error);
            run.fail(error);
        }
    }

    fn into_link(self: Arc<Self>) -> Arc<dyn Link> {
        self
    }
}

impl<I: Send + 'static, O: Send + 'static> Link for StepNode<I, O> {
    fn snapshot(&self, default_lane: &str) -> StepSnapshot {
        StepSnapshot {
            name: self.name.clone(),
            lane: self.lane_name().unwrap_or(default_lane).to_string(),
            state: self.state(),
        }
    }

    fn next_link(&self) -> Option<Arc<dyn Link>> {
        let next = lock(&self.next).clone();
        next.map(|next| next.into_link())
    }

    fn take_next_link(&self) -> Option<Arc<dyn Link>> {
        let next = lock(&self.next).take();
        next.map(|next| next.into_link())
    }
}

impl<I: Send + 'static, O: Send + 'static> Tail<O> for StepNode<I, O> {
    fn link(&self, next: Arc<dyn Entry<O>>) {
        *lock(&self.next) = Some(next);
    }
}
