//! Lane implementations.

use std::io;
use std::sync::{Arc, OnceLock};
use std::thread;
use stepchain_core::{Lane, LaneError, Work};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

static DEFAULT_LANE: OnceLock<Arc<dyn Lane>> = OnceLock::new();

/// Lane used by steps that were not given one: the ambient tokio runtime.
pub fn default_lane() -> Arc<dyn Lane> {
    DEFAULT_LANE
        .get_or_init(|| Arc::new(TokioLane::ambient()) as Arc<dyn Lane>)
        .clone()
}

/// How a [`TokioLane`] hands work to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnMode {
    /// As an async task on the runtime's workers.
    #[default]
    Task,
    /// On the runtime's blocking thread pool.
    Blocking,
}

/// Runs work on a tokio runtime.
///
/// Either bound to a specific runtime handle, or resolving the ambient
/// runtime each time work is submitted. Submitting to an ambient lane from
/// outside any runtime fails with [`LaneError::NoRuntime`].
#[derive(Debug, Clone)]
pub struct TokioLane {
    name: String,
    handle: Option<Handle>,
    mode: SpawnMode,
}

impl Default for TokioLane {
    fn default() -> Self {
        Self::ambient()
    }
}

impl TokioLane {
    /// Lane on whatever runtime is current at submit time.
    pub fn ambient() -> Self {
        Self {
            name: "tokio".to_string(),
            handle: None,
            mode: SpawnMode::Task,
        }
    }

    /// Lane bound to `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            ..Self::ambient()
        }
    }

    /// Runs work on the blocking pool instead of as async tasks.
    pub fn blocking(mut self) -> Self {
        self.mode = SpawnMode::Blocking;
        self
    }

    /// Renames the lane.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The spawn mode.
    pub fn mode(&self) -> SpawnMode {
        self.mode
    }
}

impl Lane for TokioLane {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, work: Work) -> Result<(), LaneError> {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|_| LaneError::NoRuntime {
                lane: self.name.clone(),
            })?,
        };
        match self.mode {
            SpawnMode::Task => {
                handle.spawn(async move { work() });
            }
            SpawnMode::Blocking => {
                handle.spawn_blocking(work);
            }
        }
        Ok(())
    }
}

/// A dedicated worker thread running submitted work one item at a time, in
/// submission order.
///
/// The worker exits once every clone of the lane is dropped. If a work item
/// panics the worker dies and later submissions fail with
/// [`LaneError::Closed`].
#[derive(Debug, Clone)]
pub struct SerialLane {
    name: String,
    sender: mpsc::UnboundedSender<Work>,
}

impl SerialLane {
    /// Spawns the worker thread, named after the lane.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Work>();
        let worker_name = name.clone();
        let _worker = thread::Builder::new().name(name.clone()).spawn(move || {
            while let Some(work) = receiver.blocking_recv() {
                work();
            }
            debug!("Lane '{}' worker exiting", worker_name);
        })?;
        Ok(Self { name, sender })
    }
}

impl Lane for SerialLane {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, work: Work) -> Result<(), LaneError> {
        self.sender.send(work).map_err(|_| LaneError::Closed {
            lane: self.name.clone(),
        })
    }
}

/// Runs work immediately on the submitting thread.
///
/// Chains built entirely on inline lanes run synchronously inside `start`,
/// and each step runs inside its predecessor's `resolve` call. Stack depth
/// therefore grows with the number of consecutive inline steps; long chains
/// should use a queueing lane such as [`TokioLane`] or [`SerialLane`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineLane;

impl Lane for InlineLane {
    fn name(&self) -> &str {
        "inline"
    }

    fn submit(&self, work: Work) -> Result<(), LaneError> {
        work();
        Ok(())
    }
}
