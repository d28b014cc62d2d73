use crate::error::{WatchError, WatchResult};
use crate::watcher::event::ChangeEvent;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

/// Why a watcher's classification task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The file went away; `Deleted` was the last event.
    Deleted,
    /// The cancellation token fired.
    Cancelled,
    /// The notification source ended the stream unexpectedly.
    Closed,
    /// The consumer dropped its stream.
    Detached,
}

impl Termination {
    pub fn is_abnormal(self) -> bool {
        matches!(self, Termination::Closed)
    }
}

/// Shared slot the task fills in before it drops its sender.
pub(crate) type TerminationSlot = Arc<OnceLock<Termination>>;

/// Ordered change events for one watcher.
///
/// Once [`recv`](Self::recv) returns `None`, [`termination`](Self::termination)
/// says why. A close that was not preceded by `Deleted` or cancellation is
/// reported as [`Termination::Closed`].
#[derive(Debug)]
pub struct ChangeEventStream {
    path: PathBuf,
    events: mpsc::Receiver<ChangeEvent>,
    termination: TerminationSlot,
}

impl ChangeEventStream {
    pub(crate) fn new(
        path: PathBuf,
        events: mpsc::Receiver<ChangeEvent>,
        termination: TerminationSlot,
    ) -> Self {
        Self {
            path,
            events,
            termination,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Set once the task has stopped.
    pub fn termination(&self) -> Option<Termination> {
        self.termination.get().copied()
    }

    /// Waits for the task to stop, discarding undelivered events, and turns
    /// the outcome into a result. An abnormal close (including a task that
    /// never recorded why it stopped) is `Err(WatchClosed)`.
    pub async fn finish(mut self) -> WatchResult<Termination> {
        while self.events.recv().await.is_some() {}

        match self.termination() {
            Some(Termination::Closed) | None => Err(WatchError::WatchClosed(self.path)),
            Some(t) => Ok(t),
        }
    }
}
