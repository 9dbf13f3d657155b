//! Push-channel message processing loop.
//!
//! Reads [`LinkEvent`]s from the live link, parses text frames into
//! typed [`ServerMessage`] variants, and routes topic data to the
//! subscribed callback. Server errors and malformed frames are reported
//! to error listeners as [`ChannelError::Protocol`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gsadmin_core::job_events::{EVENT_ERROR, EVENT_JOB_PROGRESS, EVENT_LOGS_DATA};

use crate::client::{ChannelError, LinkEvent};
use crate::manager::Inner;
use crate::messages::{parse_message, ServerMessage};
use crate::topic::route;

/// Process events from one link until it closes or `cancel` fires.
///
/// A close that was not requested through `cancel` is handed back to
/// the manager, which decides whether to reconnect.
pub(crate) async fn run_session(
    inner: Arc<Inner>,
    epoch: u64,
    mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
    cancel: CancellationToken,
) {
    let reason = loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            event = inbound.recv() => event,
        };

        match event {
            Some(LinkEvent::Text(text)) => handle_text_message(&inner, epoch, &text),
            Some(LinkEvent::Closed(reason)) => break reason,
            None => break None,
        }
    };

    inner.handle_link_closed(epoch, reason);
}

/// Dispatch a single text frame.
fn handle_text_message(inner: &Inner, epoch: u64, text: &str) {
    match parse_message(text) {
        Ok(ServerMessage::Error(data)) => {
            let detail = match &data.target {
                Some(target) => format!("{target}: {}", data.message),
                None => data.message.clone(),
            };
            tracing::warn!(error = %detail, "Push channel reported an error");
            inner.emit_error_if_current(epoch, &ChannelError::Protocol(detail));
        }
        Ok(message) => {
            let Some((key, payload)) = route(message) else {
                return;
            };
            if !inner.deliver(epoch, &key, payload) {
                tracing::debug!(topic = %key, "No subscriber for topic, dropping message");
            }
        }
        Err(e) => {
            if is_unknown_event(text) {
                tracing::trace!(raw_message = %text, "Ignoring unknown push-channel event");
                return;
            }
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse push-channel message");
            inner.emit_error_if_current(
                epoch,
                &ChannelError::Protocol(format!("Malformed frame: {e}")),
            );
        }
    }
}

/// `true` for a well-formed `{"event": ..}` frame whose event name
/// this client does not handle.
fn is_unknown_event(text: &str) -> bool {
    const KNOWN: [&str; 3] = [EVENT_JOB_PROGRESS, EVENT_LOGS_DATA, EVENT_ERROR];

    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("event")?.as_str().map(str::to_string))
        .is_some_and(|event| !KNOWN.contains(&event.as_str()))
}
