//! Single-connection push-channel manager.
//!
//! [`ChannelManager`] owns at most one physical connection to the
//! backend event endpoint and multiplexes named [`Topic`] subscriptions
//! over it. After an unexpected drop it reconnects with capped
//! exponential backoff; after [`ReconnectConfig::max_attempts`]
//! consecutive failures it gives up and reports
//! [`ChannelError::ReconnectExhausted`].
//!
//! Callbacks and error listeners run under a dispatch lock that
//! [`ChannelManager::disconnect`] also takes, so once `disconnect`
//! returns no callback is running and none will fire again.
//!
//! [`ReconnectConfig::max_attempts`]: crate::ReconnectConfig::max_attempts

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::{mpsc, watch};
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;

use crate::client::{ChannelError, Connector, Link, WsConnector};
use crate::config::ChannelConfig;
use crate::processor::run_session;
use crate::reconnect::delay_for_attempt;
use crate::topic::{Topic, TopicMessage};

/// Lifecycle state of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Callback invoked with every message routed to a topic.
pub type TopicCallback = Arc<dyn Fn(TopicMessage) + Send + Sync>;

/// Callback invoked with every connection or protocol error.
pub type ErrorListener = Arc<dyn Fn(&ChannelError) + Send + Sync>;

/// Handle returned by [`ChannelManager::add_error_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Shared handle to the push-channel manager.
///
/// Cheap to clone; every clone drives the same connection.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    state: Mutex<ManagerState>,
    /// Held while user callbacks run. Re-entrant so a callback may call
    /// back into the manager, including `disconnect`.
    dispatch: ReentrantMutex<()>,
    state_tx: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct ManagerState {
    target: Option<Target>,
    subscriptions: HashMap<String, Subscription>,
    error_listeners: Vec<(ListenerId, ErrorListener)>,
    next_listener_id: u64,
    session: Option<Session>,
    /// Pending reconnect timer, if any.
    reconnect: Option<CancellationToken>,
    attempt: u32,
    /// Bumped on every connect, disconnect and session install. Tasks
    /// carry the value they were started under and do nothing once it
    /// has moved on.
    generation: u64,
}

#[derive(Clone)]
struct Target {
    endpoint: String,
    token: String,
}

struct Session {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

struct Subscription {
    topic: Topic,
    callback: TopicCallback,
}

impl ChannelManager {
    /// Create a disconnected manager using the given transport.
    pub fn new(connector: Arc<dyn Connector>, config: ChannelConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                state: Mutex::new(ManagerState::default()),
                dispatch: ReentrantMutex::new(()),
                state_tx,
            }),
        }
    }

    /// Create a disconnected manager over the WebSocket transport.
    pub fn websocket(config: ChannelConfig) -> Self {
        let connector = Arc::new(WsConnector::new(config.path.clone()));
        Self::new(connector, config)
    }

    /// Connect to `endpoint`, replacing any existing connection.
    ///
    /// Never fails: if the reachability probe does not succeed the
    /// manager logs a degraded-mode notice, reports
    /// [`ChannelError::ProbeUnavailable`] to error listeners and stays
    /// `Disconnected`. A handshake failure after a successful probe is
    /// reported as [`ChannelError::Connection`] and retried with
    /// backoff. Returns the state reached when the call settles.
    pub async fn connect(&self, endpoint: &str, token: &str) -> ConnectionState {
        let inner = &self.inner;

        let epoch = {
            let _dispatch = inner.dispatch.lock();
            let mut st = inner.state.lock();
            if st.session.is_some() || st.reconnect.is_some() {
                tracing::info!("Replacing existing push-channel connection");
            }
            inner.close_locked(&mut st);
            st.target = Some(Target {
                endpoint: endpoint.to_string(),
                token: token.to_string(),
            });
            inner.set_state(ConnectionState::Connecting);
            st.generation
        };

        if let Err(e) = inner
            .connector
            .probe(endpoint, inner.config.probe_timeout)
            .await
        {
            tracing::warn!(
                endpoint,
                error = %e,
                "Push channel unreachable; job tracking continues in polling-only mode",
            );
            {
                let _dispatch = inner.dispatch.lock();
                let mut st = inner.state.lock();
                if st.generation != epoch {
                    return self.state();
                }
                let dropped = st.subscriptions.len();
                if dropped > 0 {
                    tracing::debug!(topics = dropped, "Dropping subscriptions made while probing");
                }
                st.subscriptions.clear();
                st.target = None;
                inner.set_state(ConnectionState::Disconnected);
            }
            inner.emit_error_if_current(epoch, &e);
            return self.state();
        }

        let result = tokio::time::timeout(
            inner.config.handshake_timeout,
            inner.connector.open(endpoint, token),
        )
        .await;
        inner.finish_handshake(epoch, result, None);

        self.state()
    }

    /// Close the connection and clear all manager-owned state.
    ///
    /// Sends a stop frame for every active topic, cancels any pending
    /// reconnect timer and removes every subscription. Error listeners
    /// stay registered. Waits for an in-flight callback to return.
    pub fn disconnect(&self) {
        let _dispatch = self.inner.dispatch.lock();
        let mut st = self.inner.state.lock();
        let topics = st.subscriptions.len();
        self.inner.close_locked(&mut st);
        tracing::info!(topics, "Push channel disconnected");
    }

    /// Register `callback` as the only listener for `topic`.
    ///
    /// Replaces any previous callback for the same topic. When
    /// connected, a `start-<topic>` frame is sent; otherwise the
    /// callback is only recorded and the caller re-subscribes once the
    /// connection is back.
    pub fn subscribe<F>(&self, topic: Topic, callback: F)
    where
        F: Fn(TopicMessage) + Send + Sync + 'static,
    {
        let key = topic.key();
        let mut st = self.inner.state.lock();

        match &st.session {
            Some(session) => {
                let _ = session.outbound.send(topic.start_message().to_frame());
            }
            None => {
                tracing::debug!(topic = %key, "Push channel not connected; start deferred");
            }
        }

        let replaced = st
            .subscriptions
            .insert(
                key.clone(),
                Subscription {
                    topic,
                    callback: Arc::new(callback),
                },
            )
            .is_some();
        tracing::debug!(topic = %key, replaced, "Subscribed");
    }

    /// Remove the callback for `topic` and send `stop-<topic>`.
    ///
    /// Returns `false` (and sends nothing) if the topic had no
    /// subscription.
    pub fn unsubscribe(&self, topic: &Topic) -> bool {
        let key = topic.key();
        let mut st = self.inner.state.lock();

        let Some(subscription) = st.subscriptions.remove(&key) else {
            return false;
        };
        if let Some(session) = &st.session {
            let _ = session
                .outbound
                .send(subscription.topic.stop_message().to_frame());
        }
        tracing::debug!(topic = %key, "Unsubscribed");
        true
    }

    /// Register a listener for connection and protocol errors.
    pub fn add_error_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        let mut st = self.inner.state.lock();
        st.next_listener_id += 1;
        let id = ListenerId(st.next_listener_id);
        st.error_listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        let mut st = self.inner.state.lock();
        let before = st.error_listeners.len();
        st.error_listeners.retain(|(existing, _)| *existing != id);
        st.error_listeners.len() != before
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.inner
            .state
            .lock()
            .subscriptions
            .contains_key(&topic.key())
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.state.lock().reconnect.is_some()
    }
}

// ---- private helpers ----

impl Inner {
    fn set_state(&self, new: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == new {
                false
            } else {
                *current = new;
                true
            }
        });
        if changed {
            tracing::debug!(state = ?new, "Push channel state changed");
        }
    }

    /// Tear down the session and timer, drop every subscription, and
    /// invalidate all running tasks.
    fn close_locked(&self, st: &mut ManagerState) {
        if let Some(session) = st.session.take() {
            for subscription in st.subscriptions.values() {
                let _ = session
                    .outbound
                    .send(subscription.topic.stop_message().to_frame());
            }
            session.cancel.cancel();
        }
        if let Some(timer) = st.reconnect.take() {
            timer.cancel();
        }
        st.subscriptions.clear();
        st.target = None;
        st.attempt = 0;
        st.generation += 1;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Install a freshly opened link as the live session.
    fn install_session(self: &Arc<Self>, st: &mut ManagerState, link: Link) {
        st.generation += 1;
        let epoch = st.generation;
        let cancel = CancellationToken::new();

        st.session = Some(Session {
            outbound: link.outbound,
            cancel: cancel.clone(),
        });
        st.reconnect = None;
        st.attempt = 0;
        self.set_state(ConnectionState::Connected);

        tokio::spawn(run_session(Arc::clone(self), epoch, link.inbound, cancel));
    }

    /// Act on the outcome of a handshake started under `epoch`.
    ///
    /// Returns `true` if the link became the live session.
    fn finish_handshake(
        self: &Arc<Self>,
        epoch: u64,
        result: Result<Result<Link, ChannelError>, Elapsed>,
        timer: Option<&CancellationToken>,
    ) -> bool {
        let superseded =
            |st: &ManagerState| st.generation != epoch || timer.is_some_and(|t| t.is_cancelled());

        let error = match result {
            Ok(Ok(link)) => {
                let mut st = self.state.lock();
                if superseded(&*st) {
                    tracing::debug!("Discarding link from a superseded connect");
                    return false;
                }
                self.install_session(&mut st, link);
                return true;
            }
            Ok(Err(e)) => e,
            Err(_) => ChannelError::Connection(format!(
                "Handshake timed out after {}ms",
                self.config.handshake_timeout.as_millis()
            )),
        };

        if superseded(&*self.state.lock()) {
            return false;
        }
        tracing::warn!(error = %error, "Push channel handshake failed");
        self.emit_error_if_current(epoch, &error);
        self.schedule_reconnect(epoch);
        false
    }

    /// Called by the session task when its link goes away.
    pub(crate) fn handle_link_closed(self: &Arc<Self>, epoch: u64, reason: Option<String>) {
        {
            let _dispatch = self.dispatch.lock();
            let mut st = self.state.lock();
            if st.generation != epoch {
                return;
            }
            st.session = None;
            self.set_state(ConnectionState::Reconnecting);
        }

        let reason = reason.unwrap_or_else(|| "stream ended".to_string());
        tracing::warn!(reason = %reason, "Push channel lost");
        self.emit_error_if_current(
            epoch,
            &ChannelError::Connection(format!("Connection lost: {reason}")),
        );
        self.schedule_reconnect(epoch);
    }

    /// Arm the reconnect timer, or give up once the attempt ceiling is
    /// reached. Replaces any timer already pending.
    fn schedule_reconnect(self: &Arc<Self>, epoch: u64) {
        let mut st = self.state.lock();
        if st.generation != epoch {
            return;
        }

        let max_attempts = self.config.reconnect.max_attempts;
        let target = match st.target.clone() {
            Some(target) if st.attempt < max_attempts => target,
            _ => {
                let attempts = st.attempt;
                self.close_locked(&mut st);
                drop(st);
                tracing::error!(attempts, "Giving up on push channel");
                self.emit_error(&ChannelError::ReconnectExhausted { attempts });
                return;
            }
        };

        let delay = delay_for_attempt(st.attempt, &self.config.reconnect);
        st.attempt += 1;
        let attempt = st.attempt;

        let timer = CancellationToken::new();
        if let Some(previous) = st.reconnect.replace(timer.clone()) {
            previous.cancel();
        }
        self.set_state(ConnectionState::Reconnecting);
        drop(st);

        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling push-channel reconnect",
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = timer.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            tracing::info!(attempt, "Reconnecting push channel");
            let result = tokio::time::timeout(
                inner.config.handshake_timeout,
                inner.connector.open(&target.endpoint, &target.token),
            )
            .await;

            if inner.finish_handshake(epoch, result, Some(&timer)) {
                tracing::info!(attempt, "Push channel reconnected");
            }
        });
    }

    /// Invoke the callback registered for `key` with `payload`.
    ///
    /// Returns `false` if the session is stale or nobody listens.
    pub(crate) fn deliver(&self, epoch: u64, key: &str, payload: TopicMessage) -> bool {
        let _dispatch = self.dispatch.lock();
        let callback = {
            let st = self.state.lock();
            if st.generation != epoch {
                return false;
            }
            st.subscriptions
                .get(key)
                .map(|subscription| Arc::clone(&subscription.callback))
        };

        match callback {
            Some(callback) => {
                callback(payload);
                true
            }
            None => false,
        }
    }

    /// Report `error` to listeners unless `epoch` has been superseded.
    pub(crate) fn emit_error_if_current(&self, epoch: u64, error: &ChannelError) {
        let _dispatch = self.dispatch.lock();
        let listeners = {
            let st = self.state.lock();
            if st.generation != epoch {
                return;
            }
            Self::listeners(&st)
        };
        for listener in listeners {
            listener(error);
        }
    }

    fn emit_error(&self, error: &ChannelError) {
        let _dispatch = self.dispatch.lock();
        let listeners = Self::listeners(&self.state.lock());
        for listener in listeners {
            listener(error);
        }
    }

    fn listeners(st: &ManagerState) -> Vec<ErrorListener> {
        st.error_listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}
