//! Step naming, configuration and the async step trait.

use crate::error::BoxError;
use crate::lane::Lane;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Type-safe step name wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name given to steps that were built without one.
    pub fn generated(id: u64) -> Self {
        Self(format!("step-{id}"))
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Configuration for a single step.
///
/// Both fields are optional: an unnamed step gets a generated name and a step
/// without a lane runs on the runtime's default lane.
///
/// # Examples
///
/// ```
/// use stepchain_core::{StepConfig, StepName};
///
/// let config = StepConfig::named("resize");
/// assert_eq!(config.name, Some(StepName::new("resize")));
/// assert!(config.lane.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StepConfig {
    /// Human-readable step name used in logs and errors.
    pub name: Option<StepName>,
    /// Lane the step body is submitted to.
    pub lane: Option<Arc<dyn Lane>>,
}

impl StepConfig {
    /// Config carrying only a name.
    pub fn named(name: impl Into<StepName>) -> Self {
        Self {
            name: Some(name.into()),
            lane: None,
        }
    }

    /// Config carrying only a lane.
    pub fn on_lane(lane: Arc<dyn Lane>) -> Self {
        Self {
            name: None,
            lane: Some(lane),
        }
    }

    /// Sets the name, keeping the lane.
    pub fn with_name(mut self, name: impl Into<StepName>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the lane, keeping the name.
    pub fn with_lane(mut self, lane: Arc<dyn Lane>) -> Self {
        self.lane = Some(lane);
        self
    }
}

/// A step whose body is an async function from input to output.
///
/// Callback-style bodies receive a handle and complete it themselves; this
/// trait is the shortcut for bodies that are naturally a single future.
/// `Ok` resolves the step and `Err` fails it.
///
/// # Examples
///
/// ```
/// use stepchain_core::{BoxError, Step, StepName};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct Double;
///
/// #[async_trait]
/// impl Step<u32, u32> for Double {
///     async fn execute(&self, input: u32) -> Result<u32, BoxError> {
///         Ok(input * 2)
///     }
///
///     fn name(&self) -> StepName {
///         StepName::new("Double")
///     }
/// }
/// ```
#[async_trait]
pub trait Step<I, O>: Send + Sync + Debug
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Runs the step.
    async fn execute(&self, input: I) -> Result<O, BoxError>;

    /// Returns the step name.
    fn name(&self) -> StepName;
}
