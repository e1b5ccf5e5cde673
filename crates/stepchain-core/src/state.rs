//! Chain outcomes and per-step states.

use crate::error::ChainError;
use crate::token::CancellationToken;
use serde::Serialize;
use std::fmt;

/// Terminal outcome of a chain run, delivered once to the `finally` handler.
#[derive(Debug, Clone)]
pub enum ChainState {
    /// The last step resolved.
    Resolved,
    /// A step failed; no later step ran.
    Errored(ChainError),
    /// The token was cancelled before a step could start.
    Canceled(CancellationToken),
}

impl ChainState {
    /// Returns `true` for [`ChainState::Resolved`].
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// Returns `true` for [`ChainState::Errored`].
    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    /// Returns `true` for [`ChainState::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// The error that ended the chain, if it errored.
    pub fn error(&self) -> Option<&ChainError> {
        match self {
            Self::Errored(error) => Some(error),
            _ => None,
        }
    }

    /// The cancellation reason, if the chain was canceled with one.
    pub fn cancellation_reason(&self) -> Option<String> {
        match self {
            Self::Canceled(token) => token.reason(),
            _ => None,
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::Errored(error) => write!(f, "errored: {error}"),
            Self::Canceled(token) => match token.reason() {
                Some(reason) => write!(f, "canceled: {reason}"),
                None => write!(f, "canceled"),
            },
        }
    }
}

/// Scheduling state of a single step.
///
/// `Pending -> Running -> {Resolved, Errored, Canceled}`. A step can also go
/// straight from `Pending` to `Canceled` or `Errored` when it never reaches
/// its lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not started yet.
    #[default]
    Pending,
    /// Body is executing or waiting for its handle to complete.
    Running,
    /// Body resolved.
    Resolved,
    /// Body failed or the lane refused it.
    Errored,
    /// Cancellation stopped the step before its body ran.
    Canceled,
}

impl NodeState {
    /// Returns `true` for the three terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Errored | Self::Canceled)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Resolved => write!(f, "resolved"),
            Self::Errored => write!(f, "errored"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}
