//! Process-wide table of OS watches.
//!
//! Every consumer goes through [`WatchRegistry::acquire`] and gets its own
//! [`Subscription`], but the OS only ever watches directories: the directory
//! containing each subscribed path is watched at most once, whatever the
//! scope. Directory watches follow names rather than inodes, so a watch
//! stays valid across rename-and-recreate rotation, and each OS event for a
//! child reaches each subscriber of that child exactly once. Entries are
//! reference counted and the OS watch is removed when the last subscription
//! in that directory is released.
//!
//! Two locks are involved. `watches` serializes acquire/release and is held
//! while calling into the provider. `routes` only guards the subscriber
//! table and is the only lock the provider's delivery path takes, so a
//! provider that blocks on its own event thread while adding a watch cannot
//! deadlock against delivery.

use crate::config::WatcherConfig;
use crate::error::{WatchError, WatchResult};
use crate::watcher::event::RawNotification;
use crate::watcher::path::canonical_path;
use crate::watcher::source::{ManualSource, NotificationSink, NotificationSource, NotifySource};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What a subscription expects of its path when it is acquired. Both
/// scopes share the watch on the containing directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchScope {
    /// The file must exist. Used while tailing it.
    File,
    /// The file may be absent; only the containing directory must exist.
    /// Used while waiting for the file to be created.
    Parent,
}

/// Identifies one acquired subscription. Releasing the same handle twice
/// fails with [`WatchError::InvalidHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: Uuid,
    path: PathBuf,
    target: PathBuf,
    scope: WatchScope,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Canonical path whose notifications this subscription receives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the OS watch is attached to.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn scope(&self) -> WatchScope {
        self.scope
    }
}

/// A handle plus the per-subscriber notification stream.
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    events: mpsc::UnboundedReceiver<RawNotification>,
}

impl Subscription {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Next raw notification for this subscription's path. `None` once the
    /// provider has closed or the handle has been released.
    pub async fn recv(&mut self) -> Option<RawNotification> {
        self.events.recv().await
    }
}

struct Route {
    id: Uuid,
    tx: Option<mpsc::UnboundedSender<RawNotification>>,
}

/// Subscriber table the provider delivers into.
#[derive(Default)]
pub(crate) struct Routes {
    table: Mutex<HashMap<PathBuf, Vec<Route>>>,
}

impl Routes {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<Route>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, path: &Path, id: Uuid, tx: mpsc::UnboundedSender<RawNotification>) {
        self.lock()
            .entry(path.to_path_buf())
            .or_default()
            .push(Route { id, tx: Some(tx) });
    }

    fn remove(&self, path: &Path, id: Uuid) {
        let mut table = self.lock();
        if let Some(routes) = table.get_mut(path) {
            routes.retain(|route| route.id != id);
            if routes.is_empty() {
                table.remove(path);
            }
        }
    }

    /// Sends never block: each subscriber has its own unbounded queue, so a
    /// slow consumer cannot hold up the others.
    pub(crate) fn dispatch(&self, notification: &RawNotification) {
        let table = self.lock();
        if let Some(routes) = table.get(&notification.path) {
            for route in routes {
                if let Some(tx) = &route.tx {
                    let _ = tx.send(notification.clone());
                }
            }
        }
    }

    pub(crate) fn close(&self) {
        for routes in self.lock().values_mut() {
            for route in routes.iter_mut() {
                route.tx = None;
            }
        }
    }
}

struct WatchEntry {
    refs: usize,
}

struct Watches {
    source: Box<dyn NotificationSource>,
    entries: HashMap<PathBuf, WatchEntry>,
    handles: HashMap<Uuid, SubscriptionHandle>,
}

struct RegistryInner {
    watches: Mutex<Watches>,
    routes: Arc<Routes>,
    backend: &'static str,
    config: WatcherConfig,
}

/// Shared, reference-counted table of OS watches. Cheap to clone; clones
/// refer to the same table.
#[derive(Clone)]
pub struct WatchRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("backend", &self.inner.backend)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WatchRegistry {
    /// Builds a registry on the platform's native notification facility.
    pub fn new(config: WatcherConfig) -> WatchResult<Self> {
        let source_config = config.clone();
        Self::with_source(config, move |sink| NotifySource::new(sink, &source_config))
    }

    /// Builds a registry on a custom provider. `factory` receives the sink
    /// the provider must deliver notifications into.
    pub fn with_source<S, F>(config: WatcherConfig, factory: F) -> WatchResult<Self>
    where
        S: NotificationSource + 'static,
        F: FnOnce(NotificationSink) -> WatchResult<S>,
    {
        let routes = Arc::new(Routes::default());
        let source = factory(NotificationSink::new(&routes))?;
        Ok(Self::from_parts(config, routes, source))
    }

    /// Builds a registry on a [`ManualSource`] and returns a clone of the
    /// source for injecting notifications.
    pub fn manual(config: WatcherConfig) -> (Self, ManualSource) {
        let routes = Arc::new(Routes::default());
        let source = ManualSource::new(NotificationSink::new(&routes));
        let handle = source.clone();
        (Self::from_parts(config, routes, source), handle)
    }

    fn from_parts<S>(config: WatcherConfig, routes: Arc<Routes>, source: S) -> Self
    where
        S: NotificationSource + 'static,
    {
        let backend = source.backend_name();
        Self {
            inner: Arc::new(RegistryInner {
                watches: Mutex::new(Watches {
                    source: Box::new(source),
                    entries: HashMap::new(),
                    handles: HashMap::new(),
                }),
                routes,
                backend,
                config,
            }),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend
    }

    /// Registers interest in `path`.
    ///
    /// Reuses the watch on the containing directory when one exists,
    /// otherwise creates it. The returned subscription receives every
    /// notification whose resolved path equals `path`. With
    /// [`WatchScope::File`] a missing file is [`WatchError::NotFound`].
    pub fn acquire(&self, path: &Path, scope: WatchScope) -> WatchResult<Subscription> {
        let path = canonical_path(path)?;
        let target = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| WatchError::NotFound(path.clone()))?;

        if scope == WatchScope::File {
            fs::metadata(&path).map_err(|e| WatchError::from_io(e, &path))?;
        }

        let mut guard = self.watches();
        let watches = &mut *guard;
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        // Route first so nothing reported right after the OS watch lands is lost.
        self.inner.routes.insert(&path, id, tx);

        match watches.entries.get_mut(&target) {
            Some(entry) => {
                entry.refs += 1;
                debug!(path = %target.display(), refs = entry.refs, "reusing watch");
            }
            None => {
                if let Err(e) = watches.source.watch(&target) {
                    self.inner.routes.remove(&path, id);
                    return Err(e);
                }
                watches
                    .entries
                    .insert(target.clone(), WatchEntry { refs: 1 });
                debug!(path = %target.display(), backend = self.inner.backend, "added watch");
            }
        }

        let handle = SubscriptionHandle {
            id,
            path,
            target,
            scope,
        };
        watches.handles.insert(id, handle.clone());

        Ok(Subscription { handle, events: rx })
    }

    /// Drops one reference on the handle's target and removes the OS watch
    /// when none remain.
    pub fn release(&self, handle: &SubscriptionHandle) -> WatchResult<()> {
        let mut guard = self.watches();
        let watches = &mut *guard;

        let Some(record) = watches.handles.remove(&handle.id) else {
            return Err(WatchError::InvalidHandle {
                id: handle.id,
                path: handle.path.clone(),
            });
        };
        self.inner.routes.remove(&record.path, record.id);

        let Some(entry) = watches.entries.get_mut(&record.target) else {
            return Err(WatchError::InvalidHandle {
                id: record.id,
                path: record.path,
            });
        };

        entry.refs -= 1;
        debug!(path = %record.target.display(), refs = entry.refs, "released watch reference");

        if entry.refs == 0 {
            watches.entries.remove(&record.target);
            match watches.source.unwatch(&record.target) {
                Ok(()) => debug!(path = %record.target.display(), "removed watch"),
                // The backend drops the descriptor itself once the directory is gone.
                Err(WatchError::NotFound(_)) => {
                    debug!(path = %record.target.display(), "watch already gone")
                }
                Err(e) => {
                    warn!(path = %record.target.display(), error = %e, "failed to remove watch")
                }
            }
        }

        Ok(())
    }

    /// Number of live subscriptions sharing the directory watch that covers
    /// `path`. 0 means no OS watch is held for it.
    pub fn ref_count(&self, path: &Path) -> usize {
        let Ok(path) = canonical_path(path) else {
            return 0;
        };

        path.parent()
            .and_then(|target| self.watches().entries.get(target).map(|e| e.refs))
            .unwrap_or(0)
    }

    /// Ends every subscriber's notification stream. Running watchers treat
    /// it as an abnormal close and release their handles on the way out.
    pub fn shutdown(&self) {
        debug!(backend = self.inner.backend, "closing all notification streams");
        self.inner.routes.close();
    }

    fn watches(&self) -> MutexGuard<'_, Watches> {
        self.inner
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
