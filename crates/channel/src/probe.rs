//! Pre-connect reachability probe.
//!
//! A cheap `GET /health` with a short timeout, so a missing backend is
//! detected without waiting out the full WebSocket handshake timeout.
//! This is not an authentication check: any 2xx counts as reachable.

use std::time::Duration;

use crate::client::ChannelError;

/// Probe `{endpoint}/health`, failing with
/// [`ChannelError::ProbeUnavailable`] on timeout, transport error, or a
/// non-success status.
pub async fn check_health(
    client: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
) -> Result<(), ChannelError> {
    let url = format!("{}/health", http_base(endpoint));

    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ChannelError::ProbeUnavailable(format!(
                    "{url} did not answer within {}ms",
                    timeout.as_millis()
                ))
            } else {
                ChannelError::ProbeUnavailable(format!("{url} unreachable: {e}"))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ChannelError::ProbeUnavailable(format!(
            "{url} returned {}",
            status.as_u16()
        )));
    }

    tracing::debug!(url = %url, "Health probe succeeded");
    Ok(())
}

/// Normalise an endpoint to its HTTP base URL without trailing slash.
///
/// `ws://` and `wss://` endpoints are mapped to `http://` and
/// `https://` so the same endpoint string can be used for both the
/// probe and the WebSocket.
pub fn http_base(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_base_keeps_http_endpoints() {
        assert_eq!(http_base("http://fleet.local:3001/"), "http://fleet.local:3001");
        assert_eq!(http_base("https://fleet.example.com"), "https://fleet.example.com");
    }

    #[test]
    fn http_base_maps_websocket_schemes() {
        assert_eq!(http_base("ws://fleet.local:3001"), "http://fleet.local:3001");
        assert_eq!(http_base("wss://fleet.example.com/"), "https://fleet.example.com");
    }
}
