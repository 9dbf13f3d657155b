//! In-process [`Connector`] with a scriptable fake server.
//!
//! Used by the test suites of this crate and of the job tracker, and
//! handy for running the client without a backend. Every accepted
//! handshake yields a [`ServerEnd`] the caller can use to push events
//! to the client and inspect the control frames it sent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::{ChannelError, Connector, Link, LinkEvent};

/// Scriptable in-memory connector.
#[derive(Default)]
pub struct MemoryConnector {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    unreachable: bool,
    probe_delay: Duration,
    /// `None` accepts every handshake, `Some(n)` refuses the next `n`,
    /// `Some(usize::MAX)` refuses all.
    refuse_remaining: Option<usize>,
    probes: usize,
    open_times: Vec<Instant>,
    servers: VecDeque<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the health probe fail (`false`) or succeed (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    /// Hold every health probe for `delay` before answering.
    pub fn set_probe_delay(&self, delay: Duration) {
        self.state.lock().probe_delay = delay;
    }

    /// Refuse the next `count` handshakes.
    pub fn refuse_handshakes(&self, count: usize) {
        self.state.lock().refuse_remaining = Some(count);
    }

    /// Refuse every handshake from now on.
    pub fn refuse_all_handshakes(&self) {
        self.state.lock().refuse_remaining = Some(usize::MAX);
    }

    /// Accept handshakes again.
    pub fn accept_handshakes(&self) {
        self.state.lock().refuse_remaining = None;
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().probes
    }

    /// Number of handshake attempts, accepted or refused.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_times.len()
    }

    /// Instants at which handshakes were attempted, in order.
    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().open_times.clone()
    }

    /// Take the server side of the oldest accepted link not yet taken.
    pub fn take_server(&self) -> Option<ServerEnd> {
        self.state.lock().servers.pop_front()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn probe(&self, endpoint: &str, _timeout: Duration) -> Result<(), ChannelError> {
        let delay = {
            let mut state = self.state.lock();
            state.probes += 1;
            state.probe_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if state.unreachable {
            return Err(ChannelError::ProbeUnavailable(format!(
                "{endpoint}/health did not answer"
            )));
        }
        Ok(())
    }

    async fn open(&self, endpoint: &str, _token: &str) -> Result<Link, ChannelError> {
        let mut state = self.state.lock();
        state.open_times.push(Instant::now());

        if let Some(remaining) = state.refuse_remaining {
            if remaining > 0 {
                if remaining != usize::MAX {
                    state.refuse_remaining = Some(remaining - 1);
                }
                return Err(ChannelError::Connection(format!(
                    "Failed to connect to {endpoint}: connection refused"
                )));
            }
            state.refuse_remaining = None;
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        state.servers.push_back(ServerEnd {
            received: out_rx,
            sender: in_tx,
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Server side of an in-memory link.
pub struct ServerEnd {
    received: mpsc::UnboundedReceiver<String>,
    sender: mpsc::UnboundedSender<LinkEvent>,
}

impl ServerEnd {
    /// Send a raw text frame to the client. Returns `false` once the
    /// client has gone away.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.sender.send(LinkEvent::Text(text.into())).is_ok()
    }

    /// Send `{"event": event, "data": data}` to the client.
    pub fn send_event(&self, event: &str, data: serde_json::Value) -> bool {
        let frame = serde_json::json!({ "event": event, "data": data });
        self.send_text(frame.to_string())
    }

    /// Drop the connection from the server side.
    pub fn close(self, reason: Option<&str>) {
        let _ = self
            .sender
            .send(LinkEvent::Closed(reason.map(str::to_string)));
    }

    /// Next control frame the client sent, if one is already queued.
    pub fn try_next_frame(&mut self) -> Option<serde_json::Value> {
        let text = self.received.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    /// All control frames queued so far.
    pub fn drain_frames(&mut self) -> Vec<serde_json::Value> {
        std::iter::from_fn(|| self.try_next_frame()).collect()
    }

    /// `true` once the client has dropped its end of the link and every
    /// queued frame has been read. Consumes a pending frame if there is
    /// one, so call [`drain_frames`](Self::drain_frames) first.
    pub fn is_closed_by_client(&mut self) -> bool {
        matches!(
            self.received.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        )
    }
}
