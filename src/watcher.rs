//! File-change detection for tailers.
//!
//! - [`registry`]: reference-counted OS watches shared between watchers
//! - [`source`]: notification providers (native `notify`, manual)
//! - [`file`]: `block_until_exists` and `change_events` for one path
//! - [`classify`]: raw notification to [`ChangeEvent`] rules
//! - [`stream`]: the per-watcher event stream and why it ended

pub mod classify;
pub mod event;
pub mod file;
pub mod path;
pub mod registry;
pub mod source;
pub mod stream;

pub use event::{ChangeEvent, RawNotification, RawOp};
pub use file::FileWatcher;
pub use registry::{Subscription, SubscriptionHandle, WatchRegistry, WatchScope};
pub use source::{ManualSource, NotificationSink, NotificationSource, NotifySource};
pub use stream::{ChangeEventStream, Termination};
