//! Step handles and their write-once completion slot.

use crate::chain::StepChain;
use crate::node::{lock, Splice};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use stepchain_core::{BoxError, StepName};
use tracing::{debug, warn};

/// How a step body ended. The node decides what happens next.
pub(crate) enum Completion<O> {
    /// Continue with the statically linked next step.
    Resolved(O),
    /// Continue with a chain supplied at runtime instead.
    Spliced(O, Splice<O>),
    /// Stop the chain.
    Failed(BoxError),
}

pub(crate) type Listener<O> = Box<dyn FnOnce(Completion<O>) + Send + 'static>;

struct Slot<O> {
    step_name: StepName,
    listener: Mutex<Option<Listener<O>>>,
}

impl<O> Slot<O> {
    fn complete(&self, completion: Completion<O>) -> bool {
        let listener = lock(&self.listener).take();
        match listener {
            Some(listener) => {
                listener(completion);
                true
            }
            None => {
                debug!(
                    "Step '{}' was already completed; ignoring repeated completion",
                    self.step_name
                );
                false
            }
        }
    }

    fn is_completed(&self) -> bool {
        lock(&self.listener).is_none()
    }
}

impl<O> Drop for Slot<O> {
    fn drop(&mut self) {
        let pending = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if pending {
            warn!(
                "Step '{}' dropped its handle without resolving or failing; the chain will not finish",
                self.step_name
            );
        }
    }
}

/// Write-once completion side of a step.
///
/// Clones share one slot: whichever clone completes first wins and every
/// later call returns `false` without effect. Moving a completer into a
/// callback lets a step finish from another thread long after its body
/// returned.
pub struct Completer<O> {
    slot: Arc<Slot<O>>,
}

impl<O> Clone for Completer<O> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<O> fmt::Debug for Completer<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("step_name", &self.slot.step_name)
            .field("completed", &self.slot.is_completed())
            .finish()
    }
}

impl<O: Send + 'static> Completer<O> {
    pub(crate) fn new(step_name: StepName, listener: Listener<O>) -> Self {
        Self {
            slot: Arc::new(Slot {
                step_name,
                listener: Mutex::new(Some(listener)),
            }),
        }
    }

    /// Name of the step this completer belongs to.
    pub fn step_name(&self) -> &StepName {
        &self.slot.step_name
    }

    /// Returns `true` once any clone has resolved or failed the step.
    pub fn is_completed(&self) -> bool {
        self.slot.is_completed()
    }

    /// Resolves the step with `output`.
    ///
    /// The output goes to the next linked step, or the chain finishes when
    /// this step is the last one. Accepted even if the chain was cancelled
    /// while the body ran; the next step performs the cancellation check.
    /// Returns `false` if the step was already completed.
    pub fn resolve(&self, output: O) -> bool {
        self.slot.complete(Completion::Resolved(output))
    }

    /// Fails the step and with it the chain.
    ///
    /// Returns `false` if the step was already completed.
    pub fn fail(&self, error: impl Into<BoxError>) -> bool {
        self.slot.complete(Completion::Failed(error.into()))
    }

    /// Resolves the step but continues with `chain` instead of the statically
    /// linked next step.
    ///
    /// The spliced chain runs under the running chain's cancellation token
    /// and handlers; its own token and handlers are discarded. Its default
    /// lane is kept when it set one, otherwise its steps use the running
    /// chain's default lane. Its outcome becomes the running chain's outcome. Splicing a chain that was already
    /// started fails the step with [`ChainError::AlreadyStarted`].
    ///
    /// Returns `false` if the step was already completed, in which case
    /// `chain` is dropped without running.
    ///
    /// [`ChainError::AlreadyStarted`]: stepchain_core::ChainError::AlreadyStarted
    pub fn resolve_then_append<X>(&self, output: O, chain: StepChain<O, X>) -> bool
    where
        X: Send + 'static,
    {
        if self.is_completed() {
            return self.resolve(output);
        }
        match chain.into_splice() {
            Ok(splice) => self.slot.complete(Completion::Spliced(output, splice)),
            Err(error) => self.fail(error),
        }
    }
}

/// Handle passed into a step body: the step's input plus its completer.
///
/// # Examples
///
/// ```
/// use stepchain::prelude::*;
///
/// let chain = StepChain::named("parse", |handle: StepHandle<String, usize>| {
///     match handle.input().parse::<usize>() {
///         Ok(n) => handle.resolve(n),
///         Err(e) => handle.fail(e),
///     };
/// });
/// assert_eq!(chain.step_count(), 1);
/// ```
pub struct StepHandle<I, O> {
    input: I,
    completer: Completer<O>,
}

impl<I: fmt::Debug, O> fmt::Debug for StepHandle<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepHandle")
            .field("input", &self.input)
            .field("completer", &self.completer)
            .finish()
    }
}

impl<I, O: Send + 'static> StepHandle<I, O> {
    pub(crate) fn new(input: I, completer: Completer<O>) -> Self {
        Self { input, completer }
    }

    /// The output of the previous step, or the chain's start input.
    pub fn input(&self) -> &I {
        &self.input
    }

    /// Name of the running step.
    pub fn step_name(&self) -> &StepName {
        self.completer.step_name()
    }

    /// A completer sharing this handle's slot.
    pub fn completer(&self) -> Completer<O> {
        self.completer.clone()
    }

    /// Splits the handle into its owned input and completer.
    pub fn into_parts(self) -> (I, Completer<O>) {
        (self.input, self.completer)
    }

    /// See [`Completer::resolve`].
    pub fn resolve(&self, output: O) -> bool {
        self.completer.resolve(output)
    }

    /// See [`Completer::fail`].
    pub fn fail(&self, error: impl Into<BoxError>) -> bool {
        self.completer.fail(error)
    }

    /// See [`Completer::resolve_then_append`].
    pub fn resolve_then_append<X>(&self, output: O, chain: StepChain<O, X>) -> bool
    where
        X: Send + 'static,
    {
        self.completer.resolve_then_append(output, chain)
    }
}
