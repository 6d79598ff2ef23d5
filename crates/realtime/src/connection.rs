use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use marketwire_core::EntityId;
use marketwire_core::config::Config;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::ConnectionError;
use crate::router::EventSink;
use crate::transport::{
    InboundFrames, SocketConnection, SocketHandle, SocketTransport, WebSocketTransport,
};
use crate::wire::{InboundEvent, OutboundEvent};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    Chat,
    Notifications,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Supplies the bearer token for new connections.
pub trait TokenSource: Send + Sync + 'static {
    fn token(&self) -> Option<String>;
}

/// A fixed token, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub grace_period: Duration,
    pub max_reconnect_attempts: u32,
}

impl ConnectionSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            url: config.server.url.clone(),
            connect_timeout: config.connection.connect_timeout(),
            grace_period: config.connection.grace_period(),
            max_reconnect_attempts: config.connection.max_reconnect_attempts,
        }
    }
}

struct Subscriber {
    kind: SubscriberKind,
    on_disconnect: Option<DisconnectCallback>,
}

type ConnectAttempt = Shared<BoxFuture<'static, Option<SocketHandle>>>;

struct InFlight {
    attempt: ConnectAttempt,
    task: AbortHandle,
}

/// The grace-period close scheduled when the last subscriber leaves.
struct Teardown {
    ticket: u64,
    task: JoinHandle<()>,
}

struct ManagerState {
    status: ConnectionState,
    reconnect_attempts: u32,
    subscribers: HashMap<String, Subscriber>,
    socket: Option<SocketHandle>,
    in_flight: Option<InFlight>,
    teardown: Option<Teardown>,
    teardown_tickets: u64,
    generation: u64,
    page_visible: bool,
    online: bool,
}

impl ManagerState {
    fn wants_connection(&self) -> bool {
        !self.subscribers.is_empty()
            && self.status == ConnectionState::Disconnected
            && self.in_flight.is_none()
    }
}

struct Inner<T> {
    transport: T,
    tokens: Arc<dyn TokenSource>,
    sink: Arc<dyn EventSink>,
    settings: ConnectionSettings,
    state: Mutex<ManagerState>,
    status: watch::Sender<ConnectionState>,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, state: &mut ManagerState, status: ConnectionState) {
        if state.status != status {
            debug!(from = ?state.status, to = ?status, "connection state changed");
        }
        state.status = status;
        self.status.send_replace(status);
    }
}

enum ConnectStart {
    Ready(SocketHandle),
    Pending(ConnectAttempt),
    Unavailable,
}

/// Owns the one socket shared by every feature that wants live events.
///
/// Demand is tracked per subscriber. The first subscriber opens the socket;
/// the socket closes a grace period after the last one leaves. Concurrent
/// connect requests share a single attempt.
pub struct ConnectionManager<T: SocketTransport = WebSocketTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: SocketTransport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SocketTransport> fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("status", &state.status)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<T: SocketTransport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        settings: ConnectionSettings,
        tokens: Arc<dyn TokenSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                transport,
                tokens,
                sink,
                settings,
                state: Mutex::new(ManagerState {
                    status: ConnectionState::Disconnected,
                    reconnect_attempts: 0,
                    subscribers: HashMap::new(),
                    socket: None,
                    in_flight: None,
                    teardown: None,
                    teardown_tickets: 0,
                    generation: 0,
                    page_visible: true,
                    online: true,
                }),
                status,
            }),
        }
    }

    /// Register demand for the connection. The socket is opened when this is
    /// the first subscriber and a token is available; otherwise the current
    /// socket, or the attempt already under way, is returned.
    pub async fn subscribe(
        &self,
        id: impl Into<String>,
        kind: SubscriberKind,
        on_disconnect: Option<DisconnectCallback>,
    ) -> Option<SocketHandle> {
        let id = id.into();
        let first = {
            let mut state = self.inner.lock();
            if let Some(teardown) = state.teardown.take() {
                teardown.task.abort();
                debug!("pending teardown cancelled by new subscriber");
            }
            let first = state.subscribers.is_empty();
            state
                .subscribers
                .insert(id.clone(), Subscriber { kind, on_disconnect });
            first
        };
        info!(subscriber_id = %id, ?kind, "subscriber added");

        if first {
            return self.connect().await;
        }

        let pending = {
            let state = self.inner.lock();
            match (&state.socket, &state.in_flight) {
                (Some(socket), _) if state.status == ConnectionState::Connected => {
                    return Some(socket.clone());
                }
                (_, Some(in_flight)) => in_flight.attempt.clone(),
                _ => return None,
            }
        };
        pending.await
    }

    /// Remove demand. When nobody is left the socket is closed after the
    /// grace period, unless someone subscribes in the meantime.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut state = self.inner.lock();
        if state.subscribers.remove(id).is_none() {
            return false;
        }
        info!(subscriber_id = %id, remaining = state.subscribers.len(), "subscriber removed");

        if state.subscribers.is_empty() {
            if let Some(previous) = state.teardown.take() {
                previous.task.abort();
            }
            state.teardown_tickets += 1;
            let ticket = state.teardown_tickets;
            let manager = self.clone();
            let grace = self.inner.settings.grace_period;
            let task = tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                manager.finish_idle_teardown(ticket);
            });
            state.teardown = Some(Teardown { ticket, task });
        }
        true
    }

    /// Open the socket, or join the attempt already under way. Resolves to
    /// `None` when there is no token, the handshake fails, or it times out.
    pub async fn connect(&self) -> Option<SocketHandle> {
        match self.start_connect() {
            ConnectStart::Ready(socket) => Some(socket),
            ConnectStart::Pending(attempt) => attempt.await,
            ConnectStart::Unavailable => None,
        }
    }

    /// Close the socket and drop every subscriber. Each dropped subscriber's
    /// disconnect callback runs, whether or not a socket was open.
    pub fn force_disconnect(&self) {
        let callbacks = {
            let mut state = self.inner.lock();
            if let Some(teardown) = state.teardown.take() {
                teardown.task.abort();
            }
            self.close_locked(&mut state, true)
        };
        info!("connection force-closed");
        notify_disconnected(callbacks);
    }

    pub fn on_visibility_change(&self, visible: bool) {
        let reconnect = {
            let mut state = self.inner.lock();
            state.page_visible = visible;
            visible && state.online && state.wants_connection()
        };
        if reconnect {
            info!("page visible again, reconnecting");
            self.start_connect();
        }
    }

    pub fn on_network_change(&self, network: NetworkStatus) {
        match network {
            NetworkStatus::Online => {
                let reconnect = {
                    let mut state = self.inner.lock();
                    state.online = true;
                    state.wants_connection()
                };
                if reconnect {
                    info!("network back online, reconnecting");
                    self.start_connect();
                }
            }
            NetworkStatus::Offline => {
                let callbacks = {
                    let mut state = self.inner.lock();
                    state.online = false;
                    self.close_locked(&mut state, false)
                };
                warn!("network offline, connection marked disconnected");
                notify_disconnected(callbacks);
            }
        }
    }

    pub fn on_page_unload(&self) {
        self.force_disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().status
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn subscriber_kind(&self, id: &str) -> Option<SubscriberKind> {
        self.inner.lock().subscribers.get(id).map(|s| s.kind)
    }

    pub fn is_page_visible(&self) -> bool {
        self.inner.lock().page_visible
    }

    /// Send an event on the live socket. Returns `false` when not connected.
    pub fn emit(&self, event: OutboundEvent) -> bool {
        let socket = {
            let state = self.inner.lock();
            match (&state.socket, state.status) {
                (Some(socket), ConnectionState::Connected) => socket.clone(),
                _ => {
                    debug!(event = event.name(), "not connected, outbound event dropped");
                    return false;
                }
            }
        };

        let sent = event
            .encode()
            .map_err(|error| ConnectionError::TransportError(error.to_string()))
            .and_then(|text| socket.send(text));
        match sent {
            Ok(()) => true,
            Err(error) => {
                warn!(event = event.name(), error = %error, "failed to send outbound event");
                false
            }
        }
    }

    pub fn send_typing(&self, chat_id: &str, typing: bool) -> bool {
        self.emit(OutboundEvent::Typing {
            chat_id: chat_id.to_string(),
            typing,
        })
    }

    pub fn mark_chat_read(&self, chat_id: &str) -> bool {
        self.emit(OutboundEvent::ChatRead {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn join_chat(&self, chat_id: &str) -> bool {
        self.emit(OutboundEvent::ChatJoin {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn leave_chat(&self, chat_id: &str) -> bool {
        self.emit(OutboundEvent::ChatLeave {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn mark_notification_read(&self, id: impl Into<EntityId>) -> bool {
        self.emit(OutboundEvent::NotificationRead { id: id.into() })
    }

    pub fn mark_all_notifications_read(&self) -> bool {
        self.emit(OutboundEvent::NotificationsReadAll)
    }

    fn start_connect(&self) -> ConnectStart {
        let token = self.inner.tokens.token();
        let mut state = self.inner.lock();

        if state.status == ConnectionState::Connected
            && let Some(socket) = &state.socket
        {
            return ConnectStart::Ready(socket.clone());
        }
        if let Some(in_flight) = &state.in_flight {
            return ConnectStart::Pending(in_flight.attempt.clone());
        }
        let Some(token) = token else {
            warn!("no auth token available, not connecting");
            return ConnectStart::Unavailable;
        };

        state.generation += 1;
        let generation = state.generation;
        self.inner.set_status(&mut state, ConnectionState::Connecting);
        info!(url = %self.inner.settings.url, "connecting");

        let task = tokio::spawn(self.clone().establish(token, generation));
        let abort = task.abort_handle();
        let attempt = async move { task.await.ok().flatten() }.boxed().shared();
        state.in_flight = Some(InFlight {
            attempt: attempt.clone(),
            task: abort,
        });
        ConnectStart::Pending(attempt)
    }

    async fn establish(self, token: String, generation: u64) -> Option<SocketHandle> {
        let inner = &self.inner;
        let result = tokio::time::timeout(
            inner.settings.connect_timeout,
            inner.transport.connect(&inner.settings.url, &token),
        )
        .await
        .unwrap_or(Err(ConnectionError::Timeout));

        let mut state = inner.lock();
        if state.generation != generation {
            debug!("connect attempt superseded");
            if let Ok(connection) = result {
                connection.handle.close();
            }
            return None;
        }
        state.in_flight = None;

        match result {
            Ok(SocketConnection { handle, inbound }) => {
                state.reconnect_attempts = 0;
                state.socket = Some(handle.clone());
                inner.set_status(&mut state, ConnectionState::Connected);
                drop(state);

                info!(socket_id = handle.id(), "connected");
                tokio::spawn(self.clone().pump(handle.clone(), inbound, generation));
                Some(handle)
            }
            Err(error) => {
                state.reconnect_attempts = state
                    .reconnect_attempts
                    .saturating_add(1)
                    .min(inner.settings.max_reconnect_attempts);
                inner.set_status(&mut state, ConnectionState::Disconnected);
                let attempts = state.reconnect_attempts;
                drop(state);

                if error.is_auth_failure() {
                    error!(error = %error, "authentication rejected, dropping connection");
                    self.force_disconnect();
                } else {
                    warn!(error = %error, attempts, "connect failed");
                }
                None
            }
        }
    }

    /// Feed inbound frames to the sink in arrival order until the socket
    /// closes. Frames queued before the close, including a final error, are
    /// still handled.
    async fn pump(self, socket: SocketHandle, mut inbound: InboundFrames, generation: u64) {
        let closed = socket.closed_token();
        let failure = loop {
            let next = tokio::select! {
                biased;
                next = inbound.recv() => next,
                _ = closed.cancelled() => break None,
            };

            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(error)) => break Some(error),
                None => break None,
            };
            if !self.is_current(generation) {
                debug!("socket replaced, remaining frames dropped");
                return;
            }

            let event = match InboundEvent::decode(&text) {
                Ok(event) => event,
                Err(error) => {
                    warn!(error = %error, "dropping malformed frame");
                    continue;
                }
            };

            match event {
                InboundEvent::Connect => debug!("server acknowledged connection"),
                InboundEvent::Reconnect => {
                    self.inner.lock().reconnect_attempts = 0;
                    info!("transport reconnected");
                }
                InboundEvent::Disconnect { reason } => {
                    info!(reason = reason.as_deref().unwrap_or("unknown"), "server closed connection");
                    break None;
                }
                InboundEvent::ConnectError { message } => {
                    let error = ConnectionError::TransportError(message);
                    if error.is_auth_failure() {
                        break Some(error);
                    }
                    warn!(error = %error, "transport reported connect error");
                }
                event => self.inner.sink.route(event).await,
            }
        };

        self.on_transport_closed(generation, failure);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    fn on_transport_closed(&self, generation: u64, failure: Option<ConnectionError>) {
        if let Some(error) = &failure
            && error.is_auth_failure()
        {
            if self.is_current(generation) {
                error!(error = %error, "authentication rejected, dropping connection");
                self.force_disconnect();
            }
            return;
        }

        let callbacks = {
            let mut state = self.inner.lock();
            if state.generation != generation {
                return;
            }
            self.close_locked(&mut state, false)
        };
        match failure {
            Some(error) => warn!(error = %error, "connection lost"),
            None => info!("connection closed"),
        }
        notify_disconnected(callbacks);
    }

    fn finish_idle_teardown(&self, ticket: u64) {
        let callbacks = {
            let mut state = self.inner.lock();
            let current = state
                .teardown
                .as_ref()
                .is_some_and(|teardown| teardown.ticket == ticket);
            if !current {
                debug!(ticket, "superseded teardown ignored");
                return;
            }
            state.teardown = None;
            if !state.subscribers.is_empty() {
                return;
            }
            self.close_locked(&mut state, false)
        };
        info!("no subscribers left, connection closed");
        notify_disconnected(callbacks);
    }

    /// Close the socket and cancel any attempt in flight. Returns the
    /// disconnect callbacks to run once the lock is released: those of
    /// dropped subscribers, or of all subscribers if a connection was up.
    fn close_locked(
        &self,
        state: &mut ManagerState,
        drop_subscribers: bool,
    ) -> Vec<DisconnectCallback> {
        state.generation += 1;
        if let Some(in_flight) = state.in_flight.take() {
            in_flight.task.abort();
        }
        if let Some(socket) = state.socket.take() {
            socket.close();
        }

        let was_active = state.status != ConnectionState::Disconnected;
        self.inner
            .set_status(state, ConnectionState::Disconnected);

        let callbacks: Vec<DisconnectCallback> = if drop_subscribers {
            state
                .subscribers
                .drain()
                .filter_map(|(_, subscriber)| subscriber.on_disconnect)
                .collect()
        } else {
            state
                .subscribers
                .values()
                .filter_map(|subscriber| subscriber.on_disconnect.clone())
                .collect()
        };

        if was_active || drop_subscribers {
            callbacks
        } else {
            Vec::new()
        }
    }
}

fn notify_disconnected(callbacks: Vec<DisconnectCallback>) {
    for callback in callbacks {
        callback();
    }
}
