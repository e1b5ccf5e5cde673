//! Serializable view of a chain for logs and telemetry.

use serde::Serialize;
use stepchain_core::{NodeState, StepName};

/// State of one statically linked step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSnapshot {
    /// The step name.
    pub name: StepName,
    /// Name of the lane the step runs on.
    pub lane: String,
    /// Scheduling state at snapshot time.
    pub state: NodeState,
}

/// Point-in-time view of a chain.
///
/// Only statically linked steps appear; chains spliced in at runtime are not
/// part of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSnapshot {
    /// Whether `start` has been called.
    pub started: bool,
    /// Whether the chain's token is cancelled.
    pub cancelled: bool,
    /// Reason given when the token was cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// Steps in link order.
    pub steps: Vec<StepSnapshot>,
}

impl ChainSnapshot {
    /// Number of steps in the given state.
    pub fn count(&self, state: NodeState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }
}
