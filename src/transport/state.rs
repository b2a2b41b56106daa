//! Worker lifecycle state and stop signalling

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle of a publisher or subscriber worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Created, `start()` not called yet
    #[default]
    NotStarted,
    /// Publisher is acquiring its port
    Binding,
    /// Subscriber links are being opened and the warm-up is running
    Connecting,
    /// Main loop is processing messages
    Running,
    /// Stop observed, releasing sockets
    Stopping,
    /// Worker task has exited cleanly
    Stopped,
    /// Worker task exited with an error
    Failed,
}

impl WorkerState {
    /// Whether the worker task has exited
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Failed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::NotStarted => "not-started",
            WorkerState::Binding => "binding",
            WorkerState::Connecting => "connecting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
            WorkerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State cell shared between a worker handle and its task
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedState {
    inner: Arc<RwLock<WorkerState>>,
}

impl SharedState {
    pub(crate) fn get(&self) -> WorkerState {
        *self.inner.read()
    }

    pub(crate) fn set(&self, worker: &'static str, next: WorkerState) {
        let prev = std::mem::replace(&mut *self.inner.write(), next);
        if prev != next {
            debug!(worker, from = %prev, to = %next, "Worker state changed");
        }
    }
}

/// Create the stop flag for one worker
pub(crate) fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolve once a stop has been requested.
///
/// A dropped sender counts as a stop: the owning handle is gone.
pub(crate) async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
