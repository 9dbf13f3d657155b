use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Protocol path appended to the endpoint for the WebSocket upgrade.
const DEFAULT_PATH: &str = "/ws";

/// Maximum time allowed for the WebSocket handshake.
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Maximum time allowed for the `/health` reachability probe.
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Push-channel connection parameters.
///
/// None of these change behaviour; they only tune timing and
/// addressing. The endpoint and bearer token are passed to
/// [`ChannelManager::connect`](crate::ChannelManager::connect) instead.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Path of the WebSocket endpoint (default: `/ws`).
    pub path: String,
    /// Handshake timeout (default: 10 s).
    pub handshake_timeout: Duration,
    /// Reachability probe timeout (default: 2 s).
    pub probe_timeout: Duration,
    /// Reconnection backoff bounds.
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default  |
    /// |--------------------------------------|----------|
    /// | `GSADMIN_WS_PATH`                    | `/ws`    |
    /// | `GSADMIN_HANDSHAKE_TIMEOUT_MS`       | `10000`  |
    /// | `GSADMIN_PROBE_TIMEOUT_MS`           | `2000`   |
    /// | `GSADMIN_RECONNECT_INITIAL_DELAY_MS` | `1000`   |
    /// | `GSADMIN_RECONNECT_MAX_DELAY_MS`     | `30000`  |
    /// | `GSADMIN_RECONNECT_MAX_ATTEMPTS`     | `5`      |
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let path = std::env::var("GSADMIN_WS_PATH").unwrap_or(defaults.path);

        let handshake_timeout = Duration::from_millis(env_or(
            "GSADMIN_HANDSHAKE_TIMEOUT_MS",
            DEFAULT_HANDSHAKE_TIMEOUT_MS,
        ));
        let probe_timeout =
            Duration::from_millis(env_or("GSADMIN_PROBE_TIMEOUT_MS", DEFAULT_PROBE_TIMEOUT_MS));

        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(env_or(
                "GSADMIN_RECONNECT_INITIAL_DELAY_MS",
                defaults.reconnect.initial_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(env_or(
                "GSADMIN_RECONNECT_MAX_DELAY_MS",
                defaults.reconnect.max_delay.as_millis() as u64,
            )),
            max_attempts: env_or(
                "GSADMIN_RECONNECT_MAX_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
            ..defaults.reconnect
        };

        Self {
            path,
            handshake_timeout,
            probe_timeout,
            reconnect,
        }
    }
}

/// Read and parse an environment variable, falling back to `default`
/// when it is unset or malformed.
pub fn env_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, default = %default, "Ignoring malformed setting");
            default
        }),
        Err(_) => default,
    }
}
