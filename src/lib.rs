//! # tail_core
//!
//! The file-change detection core of a log-shipping agent: watches log files for
//! appends, truncation, rotation and deletion, and tells a tailer *when* to
//! re-read so it never re-sends or drops lines.
//!
//! ## Features
//!
//! - **Shared OS watches**: A [`WatchRegistry`] reference-counts one OS watch per
//!   directory, no matter how many tailers follow files in it
//! - **Wait for creation**: [`FileWatcher::block_until_exists`] suspends until a rotated
//!   file reappears, without racing the creation
//! - **Classified changes**: `Modified`, `Truncated` and a terminal `Deleted`, including
//!   the unlink-while-open case that inotify reports as an attribute change
//! - **Cooperative cancellation**: every wait selects on a [`CancellationToken`] and
//!   releases its watch on the way out
//! - **Pluggable providers**: native notifications via `notify`, or a [`ManualSource`]
//!   driven by the caller
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tail_core::{CancellationToken, ChangeEvent, FileWatcher, WatchRegistry, WatcherConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = WatchRegistry::new(WatcherConfig::default())?;
//! let token = CancellationToken::new();
//! let watcher = FileWatcher::new("/var/log/app.log", &registry)?;
//!
//! // Wait for the file, then follow it from the persisted tail position.
//! watcher.block_until_exists(&token).await?;
//! let mut changes = watcher.change_events(0, token.clone())?;
//!
//! while let Some(event) = changes.recv().await {
//!     match event {
//!         ChangeEvent::Modified => { /* read from tail position to new size */ }
//!         ChangeEvent::Truncated => { /* reset tail position to 0, then read */ }
//!         ChangeEvent::Deleted => { /* tear down; block_until_exists again */ }
//!     }
//! }
//!
//! // Closed without `Deleted` or cancellation is an abnormal close.
//! let termination = changes.finish().await?;
//! # let _ = termination;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`watcher::registry`]**: Reference-counted table of OS watches and subscriber routing
//! - **[`watcher::source`]**: Raw notification providers
//! - **[`watcher::file`]**: Per-path watcher operations
//! - **[`watcher::classify`]**: Decision table from raw operations to change events
//! - **[`watcher::stream`]**: Ordered per-watcher event stream
//! - **[`config`]**: Watcher settings
//! - **[`error`]**: Unified error handling
//!
//! ## Error Handling
//!
//! All fallible operations return [`WatchResult<T>`], wrapping [`WatchError`].
//! Cancellation surfaces as [`WatchError::Cancelled`], an expected outcome rather than
//! a filesystem failure.

pub mod config;
pub mod error;
pub mod watcher;

/// Re-exports the most commonly used types for convenience.
pub use config::WatcherConfig;
pub use error::{WatchError, WatchResult};
pub use tokio_util::sync::CancellationToken;
pub use watcher::{
    ChangeEvent, ChangeEventStream, FileWatcher, ManualSource, Termination, WatchRegistry,
    WatchScope,
};
