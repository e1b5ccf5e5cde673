//! Chain error types.

use crate::step::StepName;
use std::sync::Arc;
use thiserror::Error;

/// Error value a step body reports through `fail`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Step error shared between the error handler and the finally handler.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors a lane returns when it cannot accept work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LaneError {
    /// The lane's worker has shut down.
    #[error("lane '{lane}' is closed")]
    Closed {
        /// Name of the lane.
        lane: String,
    },

    /// The lane needs a tokio runtime and none is running.
    #[error("lane '{lane}' has no tokio runtime to run on")]
    NoRuntime {
        /// Name of the lane.
        lane: String,
    },
}

/// Errors that end or reject a chain run.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ChainError {
    /// A step reported failure through its handle.
    #[error("Step failed: {step_name}, details: {error}")]
    StepFailed {
        /// The name of the step that failed.
        step_name: StepName,
        /// The error the step reported.
        error: SharedError,
    },

    /// The step's lane refused the work.
    #[error("Step '{step_name}' could not be scheduled: {reason}")]
    LaneRejected {
        /// The name of the step that was not scheduled.
        step_name: StepName,
        /// Why the lane refused.
        reason: LaneError,
    },

    /// `start` was called on a chain that already started.
    #[error("Chain has already been started")]
    AlreadyStarted,
}

impl ChainError {
    /// Wraps an error reported by a step.
    pub fn step_failed(step_name: StepName, error: impl Into<BoxError>) -> Self {
        let error: BoxError = error.into();
        Self::StepFailed {
            step_name,
            error: Arc::from(error),
        }
    }

    /// Name of the step the error originated from, if any.
    pub fn step_name(&self) -> Option<&StepName> {
        match self {
            Self::StepFailed { step_name, .. } | Self::LaneRejected { step_name, .. } => {
                Some(step_name)
            }
            Self::AlreadyStarted => None,
        }
    }

    /// The error a step reported, for `StepFailed`.
    pub fn step_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::StepFailed { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}
