//! Exponential-backoff parameters for push-channel reconnection.
//!
//! After an unexpected drop the manager waits
//! `min(initial_delay * multiplier^attempt, max_delay)` before each
//! attempt and gives up after [`ReconnectConfig::max_attempts`]
//! consecutive failures.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Consecutive failed attempts after which the manager stays
    /// disconnected.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Delay to wait before reconnect attempt number `attempt` (0-based).
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn delay_for_attempt(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay_ms = config.initial_delay.as_millis() as f64 * config.multiplier.powi(exponent);
    let max_ms = config.max_delay.as_millis() as f64;
    Duration::from_millis(delay_ms.min(max_ms) as u64)
}
