//! Raw notification providers.
//!
//! A provider owns the OS-level watch descriptors and pushes every
//! notification it sees into a [`NotificationSink`]. The sink fans each
//! notification out to all registry subscribers interested in its path, so a
//! provider never needs to know who is listening.

use crate::config::WatcherConfig;
use crate::error::{WatchError, WatchResult};
use crate::watcher::event::{RawNotification, RawOp};
use crate::watcher::registry::Routes;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// An OS filesystem-event facility, or anything that speaks the same
/// {Create, Write, Remove, Rename, Attrib} vocabulary.
pub trait NotificationSource: Send {
    /// Adds an OS-level watch on `path` (a file or a directory).
    fn watch(&mut self, path: &Path) -> WatchResult<()>;

    /// Removes the OS-level watch on `path`.
    fn unwatch(&mut self, path: &Path) -> WatchResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Delivery end handed to a provider when the registry is built.
#[derive(Clone)]
pub struct NotificationSink {
    routes: Weak<Routes>,
}

impl NotificationSink {
    pub(crate) fn new(routes: &Arc<Routes>) -> Self {
        Self {
            routes: Arc::downgrade(routes),
        }
    }

    /// Fans `notification` out to every subscriber of its path.
    pub fn deliver(&self, notification: RawNotification) {
        if let Some(routes) = self.routes.upgrade() {
            routes.dispatch(&notification);
        }
    }

    /// Ends every subscriber's notification stream. Watchers see this as an
    /// abnormal close.
    pub fn close(&self) {
        if let Some(routes) = self.routes.upgrade() {
            routes.close();
        }
    }
}

/// Native provider backed by `notify` (inotify, FSEvents, kqueue,
/// ReadDirectoryChangesW).
pub struct NotifySource {
    watcher: RecommendedWatcher,
}

impl NotifySource {
    pub fn new(sink: NotificationSink, config: &WatcherConfig) -> WatchResult<Self> {
        let event_handler = move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for notification in RawNotification::from_notify(event) {
                    sink.deliver(notification);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, paths = ?e.paths, "file watcher backend error");
            }
        };

        let config = Config::default().with_poll_interval(config.poll_interval);
        let watcher = RecommendedWatcher::new(event_handler, config)?;

        Ok(Self { watcher })
    }
}

impl NotificationSource for NotifySource {
    fn watch(&mut self, path: &Path) -> WatchResult<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::from_notify(e, path))
    }

    fn unwatch(&mut self, path: &Path) -> WatchResult<()> {
        self.watcher
            .unwatch(path)
            .map_err(|e| WatchError::from_notify(e, path))
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}

/// Provider driven by its caller instead of the OS.
///
/// Clones share state, so one clone can live inside a registry while another
/// injects notifications and inspects which targets are watched.
#[derive(Clone)]
pub struct ManualSource {
    inner: Arc<Mutex<ManualState>>,
}

struct ManualState {
    sink: NotificationSink,
    watched: HashSet<PathBuf>,
}

impl ManualSource {
    pub fn new(sink: NotificationSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                sink,
                watched: HashSet::new(),
            })),
        }
    }

    /// Injects a notification as if the OS had reported it.
    pub fn emit(&self, path: impl Into<PathBuf>, op: RawOp) {
        let sink = self.state().sink.clone();
        sink.deliver(RawNotification::new(path, op));
    }

    /// Simulates provider failure: every open notification stream ends.
    pub fn close(&self) {
        let sink = self.state().sink.clone();
        sink.close();
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.state().watched.contains(path)
    }

    pub fn watched_count(&self) -> usize {
        self.state().watched.len()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NotificationSource for ManualSource {
    fn watch(&mut self, path: &Path) -> WatchResult<()> {
        self.state().watched.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> WatchResult<()> {
        if self.state().watched.remove(path) {
            Ok(())
        } else {
            Err(WatchError::NotFound(path.to_path_buf()))
        }
    }

    fn backend_name(&self) -> &'static str {
        "manual"
    }
}
