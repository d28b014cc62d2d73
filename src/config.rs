use std::time::Duration;

/// Settings shared by every watcher created from one [`WatchRegistry`].
///
/// [`WatchRegistry`]: crate::watcher::registry::WatchRegistry
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Capacity of each change-event channel. A value of 0 is treated as 1.
    pub event_capacity: usize,
    /// Poll cadence handed to `notify` (only its polling backends use it).
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl WatcherConfig {
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.event_capacity.max(1)
    }
}
