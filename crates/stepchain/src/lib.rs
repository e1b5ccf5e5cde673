//! An asynchronous step-chaining engine for Rust.
//!
//! A chain is a linear sequence of steps. Each step runs on a lane, receives
//! the previous step's output through its [`StepHandle`] and either resolves
//! with an output, fails with an error, or hands off to a chain supplied at
//! runtime. One [`CancellationToken`] stops every step that has not started
//! yet.
//!
//! # Example
//!
//! ```
//! use stepchain::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, rx) = tokio::sync::oneshot::channel();
//!     let tx = std::sync::Mutex::new(Some(tx));
//!
//!     let chain = StepChain::named("fetch", |h: StepHandle<u32, String>| {
//!         h.resolve(format!("record-{}", h.input()));
//!     })
//!     .then_named("store", |h| {
//!         h.resolve(h.input().len());
//!     })
//!     .on_error(|error| eprintln!("chain failed: {error}"))
//!     .finally(move |state| {
//!         if let Some(tx) = tx.lock().ok().and_then(|mut tx| tx.take()) {
//!             let _ = tx.send(state);
//!         }
//!     });
//!
//!     chain.start(7).expect("first start");
//!     assert!(rx.await.expect("chain finished").is_resolved());
//! }
//! ```

mod chain;
mod deadline;
mod handle;
mod lane;
mod node;
mod scope;
mod snapshot;

// Re-export core types
pub use stepchain_core::*;

pub use chain::StepChain;
pub use deadline::cancel_after;
pub use handle::{Completer, StepHandle};
pub use lane::{default_lane, InlineLane, SerialLane, SpawnMode, TokioLane};
pub use node::StepNode;
pub use snapshot::{ChainSnapshot, StepSnapshot};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        cancel_after, BoxError, CancellationToken, ChainError, ChainState, Completer,
        InlineLane, Lane, NodeState, SerialLane, Step, StepChain, StepConfig, StepHandle,
        StepName, StepNode, TokioLane,
    };
}
