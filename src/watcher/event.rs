use notify::event::{EventKind, ModifyKind, RenameMode};
use std::path::PathBuf;

/// Operation classes a notification provider reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawOp {
    Create,
    Write,
    Remove,
    Rename,
    /// chmod-class metadata change. Also what inotify reports when a file
    /// that is still held open gets unlinked.
    Attrib,
}

/// A single raw notification for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub path: PathBuf,
    pub op: RawOp,
}

impl RawNotification {
    pub fn new(path: impl Into<PathBuf>, op: RawOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Flattens a `notify` event into per-path notifications.
    ///
    /// Access events and backend-specific kinds are dropped. For a rename
    /// reported with both ends, the source path gets `Rename` and the
    /// destination gets `Create`.
    pub fn from_notify(event: notify::Event) -> Vec<RawNotification> {
        let op = match event.kind {
            EventKind::Create(_) => RawOp::Create,
            EventKind::Remove(_) => RawOp::Remove,
            EventKind::Modify(ModifyKind::Metadata(_)) => RawOp::Attrib,
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                RawOp::Write
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawOp::Create,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut paths = event.paths.into_iter();
                let mut out = Vec::with_capacity(2);
                if let Some(from) = paths.next() {
                    out.push(RawNotification::new(from, RawOp::Rename));
                }
                if let Some(to) = paths.next() {
                    out.push(RawNotification::new(to, RawOp::Create));
                }
                return out;
            }
            EventKind::Modify(ModifyKind::Name(_)) => RawOp::Rename,
            EventKind::Modify(ModifyKind::Other)
            | EventKind::Access(_)
            | EventKind::Any
            | EventKind::Other => return Vec::new(),
        };

        event
            .paths
            .into_iter()
            .map(|path| RawNotification::new(path, op))
            .collect()
    }
}

/// Classified change delivered to a tailer. Carries no payload: consumers
/// re-stat the file to learn what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Modified,
    Truncated,
    /// Terminal. Nothing follows it on the same stream.
    Deleted,
}

impl ChangeEvent {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeEvent::Deleted)
    }
}
