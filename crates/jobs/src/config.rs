use std::time::Duration;

use gsadmin_channel::config::env_or;

/// Interval between status queries while a job is tracked.
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Shortest accepted poll period; tokio intervals reject zero.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Capacity of the tracker's broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Job tracker parameters.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Poll loop period (default: 2 s).
    pub poll_interval: Duration,
    /// Buffered [`TrackerEvent`](crate::TrackerEvent)s per subscriber
    /// before slow receivers start lagging.
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default |
    /// |-----------------------------------|---------|
    /// | `GSADMIN_POLL_INTERVAL_MS`        | `2000`  |
    /// | `GSADMIN_TRACKER_EVENT_CAPACITY`  | `256`   |
    pub fn from_env() -> Self {
        let poll_interval_ms = env_or("GSADMIN_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let event_capacity =
            env_or("GSADMIN_TRACKER_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY).max(1);

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms).max(MIN_POLL_INTERVAL),
            event_capacity,
        }
    }

    /// Set the poll period, raised to [`MIN_POLL_INTERVAL`] if shorter.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }
}
