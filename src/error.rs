use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("notification stream for {} closed unexpectedly", .0.display())]
    WatchClosed(PathBuf),

    #[error("invalid subscription handle {id} for {}", .path.display())]
    InvalidHandle { id: Uuid, path: PathBuf },

    #[error("watch cancelled")]
    Cancelled,

    #[error("notification backend error: {0}")]
    Backend(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no tokio runtime available to drive the watch task")]
    NoRuntime,
}

impl WatchError {
    /// Maps a `notify` failure for `path`, folding the backend's "missing path"
    /// and "no such watch" cases into [`WatchError::NotFound`].
    pub(crate) fn from_notify(err: notify::Error, path: &Path) -> Self {
        let missing = match &err.kind {
            notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => true,
            notify::ErrorKind::Io(io) => io.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        };

        if missing {
            WatchError::NotFound(path.to_path_buf())
        } else {
            WatchError::Backend(err)
        }
    }

    /// Maps a stat failure for `path`, keeping "does not exist" distinct.
    pub(crate) fn from_io(err: std::io::Error, path: &Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            WatchError::NotFound(path.to_path_buf())
        } else {
            WatchError::Io(err)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WatchError::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WatchError::NotFound(_))
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
