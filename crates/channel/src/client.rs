//! Transport seam for the push channel.
//!
//! [`Connector`] hides how the physical connection is made. The
//! manager only ever sees a [`Link`]: an outbound queue of text frames
//! and an inbound stream of [`LinkEvent`]s. [`WsConnector`] is the
//! production implementation over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::probe::{check_health, http_base};

/// Something that arrived on (or happened to) an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame from the server.
    Text(String),
    /// The link is gone. Carries the close reason when known.
    Closed(Option<String>),
}

/// One open physical connection as seen by the manager.
///
/// Dropping `outbound` closes the connection from the client side.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens physical connections to the backend event endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Cheap reachability check run before every `connect`.
    async fn probe(&self, endpoint: &str, timeout: Duration) -> Result<(), ChannelError>;

    /// Perform the handshake and return a live link.
    async fn open(&self, endpoint: &str, token: &str) -> Result<Link, ChannelError>;
}

// ---------------------------------------------------------------------------
// WebSocket connector
// ---------------------------------------------------------------------------

/// [`Connector`] over a WebSocket.
///
/// The bearer token travels in the `Authorization` header of the
/// upgrade request; a fresh `clientId` (UUID v4) is appended as a query
/// parameter so server logs can tell reconnects apart.
pub struct WsConnector {
    path: String,
    http: reqwest::Client,
}

impl WsConnector {
    /// * `path` - protocol path of the WebSocket endpoint, e.g. `/ws`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Reuse an existing [`reqwest::Client`] for the health probe.
    pub fn with_client(http: reqwest::Client, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            http,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> Result<(), ChannelError> {
        check_health(&self.http, endpoint, timeout).await
    }

    async fn open(&self, endpoint: &str, token: &str) -> Result<Link, ChannelError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = ws_url(endpoint, &self.path, &client_id);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::Connection(format!("Invalid endpoint {url}: {e}")))?;

        if !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ChannelError::Connection(format!("Invalid auth token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            ChannelError::Connection(format!("Failed to connect to {endpoint}: {e}"))
        })?;

        tracing::info!(client_id = %client_id, "Push channel connected to {endpoint}");

        Ok(spawn_pump(ws_stream))
    }
}

/// Build the WebSocket URL for `endpoint`.
pub fn ws_url(endpoint: &str, path: &str, client_id: &str) -> String {
    let base = http_base(endpoint);
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    format!("{base}{path}?clientId={client_id}")
}

/// Bridge a WebSocket stream to a [`Link`].
///
/// The spawned task forwards outbound frames, turns inbound text frames
/// into [`LinkEvent::Text`], and reports [`LinkEvent::Closed`] exactly
/// once when the socket goes away. When the manager drops the outbound
/// sender the task sends a Close frame and exits.
fn spawn_pump(ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>) -> Link {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();
    let (mut sink, mut stream) = ws_stream.split();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                outgoing = out_rx.recv() => match outgoing {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            tracing::error!(error = %e, "WebSocket send error");
                            let _ = in_tx.send(LinkEvent::Closed(Some(e.to_string())));
                            break;
                        }
                    }
                    None => {
                        // Caller-initiated close.
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let _ = in_tx.send(LinkEvent::Text(text));
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Backend closed push channel");
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = in_tx.send(LinkEvent::Closed(reason));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and raw frames are not part of the protocol.
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        let _ = in_tx.send(LinkEvent::Closed(Some(e.to_string())));
                        break;
                    }
                    None => {
                        let _ = in_tx.send(LinkEvent::Closed(None));
                        break;
                    }
                },
            }
        }
    });

    Link {
        outbound: out_tx,
        inbound: in_rx,
    }
}

/// Errors reported to push-channel error listeners.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// Handshake or transport failure; retried with backoff.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The pre-connect reachability probe failed; the client continues
    /// in polling-only mode and does not retry the probe.
    #[error("Push channel unavailable: {0}")]
    ProbeUnavailable(String),

    /// Malformed frame or server-reported error on an open connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reconnection gave up after the configured number of attempts.
    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_rewrites_scheme_and_appends_path() {
        assert_eq!(
            ws_url("http://fleet.local:3001", "/ws", "c1"),
            "ws://fleet.local:3001/ws?clientId=c1"
        );
        assert_eq!(
            ws_url("https://fleet.example.com/", "socket", "c2"),
            "wss://fleet.example.com/socket?clientId=c2"
        );
    }

    #[test]
    fn ws_url_accepts_websocket_endpoints() {
        assert_eq!(
            ws_url("ws://10.0.0.5:3001", "/ws", "c3"),
            "ws://10.0.0.5:3001/ws?clientId=c3"
        );
    }
}
