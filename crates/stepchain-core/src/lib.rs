//! Core traits and types for the stepchain step-chaining engine.
//!
//! This crate provides the runtime-free building blocks. The `stepchain`
//! crate builds chains, nodes and lanes on top of them.
//!
//! # Core Types
//!
//! - [`CancellationToken`] - One-shot cancel flag shared by a chain
//! - [`ChainState`] - Terminal outcome handed to `finally`
//! - [`NodeState`] - Scheduling state of a single step
//! - [`ChainError`] - Errors that end or reject a chain run
//! - [`Lane`] - Where step bodies execute
//!
//! # Optional Traits
//!
//! - [`Step`] - Async step bodies

mod error;
mod lane;
mod state;
mod step;
mod token;

pub use error::{BoxError, ChainError, LaneError, SharedError};
pub use lane::{Lane, Work};
pub use state::{ChainState, NodeState};
pub use step::{Step, StepConfig, StepName};
pub use token::CancellationToken;
