//! The lane seam: where step bodies actually execute.

use crate::error::LaneError;
use std::fmt::Debug;

/// A unit of work submitted to a lane.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that eventually runs submitted work.
///
/// Submission is fire-and-forget. Different lanes give no ordering
/// guarantee relative to each other; within one lane FIFO is common but not
/// required.
///
/// # Examples
///
/// ```
/// use stepchain_core::{Lane, LaneError, Work};
///
/// /// Runs work on the submitting thread.
/// #[derive(Debug)]
/// struct Immediate;
///
/// impl Lane for Immediate {
///     fn name(&self) -> &str {
///         "immediate"
///     }
///
///     fn submit(&self, work: Work) -> Result<(), LaneError> {
///         work();
///         Ok(())
///     }
/// }
/// ```
pub trait Lane: Send + Sync + Debug {
    /// Lane name used in logs and errors.
    fn name(&self) -> &str;

    /// Schedules `work` to run later.
    ///
    /// Returns an error if the lane can no longer accept work; the work is
    /// dropped without running in that case.
    fn submit(&self, work: Work) -> Result<(), LaneError>;
}
