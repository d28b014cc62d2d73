//! Per-path watcher used by a tailer.
//!
//! A tail session typically alternates between the two operations:
//! [`FileWatcher::block_until_exists`] while the file is absent, then
//! [`FileWatcher::change_events`] seeded with the persisted tail position
//! until the stream reports `Deleted`.

use crate::error::{WatchError, WatchResult};
use crate::watcher::classify::{Decision, Stat, classify};
use crate::watcher::event::{ChangeEvent, RawOp};
use crate::watcher::path::canonical_path;
use crate::watcher::registry::{Subscription, WatchRegistry, WatchScope};
use crate::watcher::stream::{ChangeEventStream, Termination, TerminationSlot};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FileWatcher {
    path: PathBuf,
    registry: WatchRegistry,
}

impl FileWatcher {
    pub fn new(path: impl AsRef<Path>, registry: &WatchRegistry) -> WatchResult<Self> {
        Ok(Self {
            path: canonical_path(path.as_ref())?,
            registry: registry.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Suspends until the path exists.
    ///
    /// Returns immediately when the file is already there. Otherwise waits on
    /// a watch of the parent directory for a creation (or rename into place)
    /// of exactly this path. Returns [`WatchError::Cancelled`] if `token`
    /// fires first and [`WatchError::WatchClosed`] if the source ends.
    pub async fn block_until_exists(&self, token: &CancellationToken) -> WatchResult<()> {
        let mut subscription = self.registry.acquire(&self.path, WatchScope::Parent)?;

        let outcome = self.wait_for_creation(&mut subscription, token).await;

        // The wait's own result wins over a failed release.
        if let Err(e) = self.registry.release(subscription.handle()) {
            warn!(path = %self.path.display(), error = %e, "failed to release watch");
        }
        outcome
    }

    async fn wait_for_creation(
        &self,
        subscription: &mut Subscription,
        token: &CancellationToken,
    ) -> WatchResult<()> {
        // The file may have been created before the directory watch landed.
        match fs::metadata(&self.path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!(path = %self.path.display(), "waiting for file to appear");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(WatchError::Cancelled),
                notification = subscription.recv() => match notification {
                    // Routing already matched the path; only the op is checked.
                    Some(n) if n.op == RawOp::Create => {
                        debug!(path = %self.path.display(), "file appeared");
                        return Ok(());
                    }
                    Some(_) => {}
                    None => return Err(WatchError::WatchClosed(self.path.clone())),
                },
            }
        }
    }

    /// Starts classifying changes to the (existing) file.
    ///
    /// `starting_size` is the number of bytes the tailer has already
    /// consumed; it seeds truncation detection. The classification runs on
    /// its own task until the file is deleted, the source closes, the token
    /// fires, or the returned stream is dropped. The registry handle is
    /// released on every one of those paths.
    pub fn change_events(
        &self,
        starting_size: u64,
        token: CancellationToken,
    ) -> WatchResult<ChangeEventStream> {
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let subscription = self.registry.acquire(&self.path, WatchScope::File)?;

        let (tx, rx) = mpsc::channel(self.registry.config().channel_capacity());
        let termination: TerminationSlot = Arc::new(OnceLock::new());

        let task = ClassifyTask {
            file: WatchedFile::new(self.path.clone(), starting_size),
            subscription,
            registry: self.registry.clone(),
            events: tx,
            token,
            termination: termination.clone(),
        };
        runtime.spawn(task.run());

        Ok(ChangeEventStream::new(self.path.clone(), rx, termination))
    }
}

/// State owned by one classification task.
#[derive(Debug)]
struct WatchedFile {
    path: PathBuf,
    size: u64,
    exists: bool,
}

impl WatchedFile {
    fn new(path: PathBuf, size: u64) -> Self {
        Self {
            path,
            size,
            exists: true,
        }
    }
}

struct ClassifyTask {
    file: WatchedFile,
    subscription: Subscription,
    registry: WatchRegistry,
    events: mpsc::Sender<ChangeEvent>,
    token: CancellationToken,
    termination: TerminationSlot,
}

impl ClassifyTask {
    async fn run(mut self) {
        let termination = self.classify_until_done().await;

        if let Err(e) = self.registry.release(self.subscription.handle()) {
            warn!(path = %self.file.path.display(), error = %e, "failed to release watch");
        }
        debug!(path = %self.file.path.display(), ?termination, "change stream finished");

        // Record the reason before `events` drops and the consumer sees the close.
        let _ = self.termination.set(termination);
    }

    async fn classify_until_done(&mut self) -> Termination {
        loop {
            let notification = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Termination::Cancelled,
                n = self.subscription.recv() => match n {
                    Some(n) => n,
                    None => return Termination::Closed,
                },
            };

            let previous_size = self.file.size;
            let path = &self.file.path;
            let decision = classify(notification.op, previous_size, || Stat::of(path));

            let (event, size) = match decision {
                Decision::Emit { event, size } => (event, size),
                Decision::Ignore => continue,
                Decision::Inconclusive(e) => {
                    warn!(path = %self.file.path.display(), op = ?notification.op, error = %e,
                        "failed to stat watched file");
                    continue;
                }
            };

            if let Some(size) = size {
                self.file.size = size;
            }
            if event.is_terminal() {
                self.file.exists = false;
            }
            debug!(path = %self.file.path.display(), op = ?notification.op, ?event,
                previous_size, size = self.file.size, "classified change");

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Termination::Cancelled,
                sent = self.events.send(event) => {
                    if sent.is_err() {
                        return Termination::Detached;
                    }
                }
            }

            if !self.file.exists {
                return Termination::Deleted;
            }
        }
    }
}
