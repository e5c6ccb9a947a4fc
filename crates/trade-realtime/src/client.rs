//! Connection manager for the realtime channel.
//!
//! Owns one transport session at a time, authenticates it with the token it
//! was constructed with, relays server events to registered listeners and
//! reconnects with a linearly growing delay after unexpected disconnects.
//!
//! Every (re)connect gets a new generation number. Events and timers that
//! belong to an older generation are ignored, so a superseded session can
//! never drive the current one.

use crate::events::{local, reason, server};
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::messages::Command;
use crate::notification::{notification_for, Notification, NotificationSurface, TracingSurface};
use crate::transport::{RealtimeTransport, TransportEvent, TransportSession};
use crate::RealtimeConfig;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    /// Reconnect attempts exhausted. Only `connect()` leaves this state.
    Failed,
}

/// Point-in-time view of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub authenticated: bool,
    pub reconnect_attempts: u32,
}

struct Connection {
    state: ConnectionState,
    authenticated: bool,
    reconnect_attempts: u32,
    generation: u64,
    session: Option<Arc<dyn TransportSession>>,
    pump: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Connection {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            authenticated: false,
            reconnect_attempts: 0,
            generation: 0,
            session: None,
            pump: None,
            reconnect_timer: None,
        }
    }

    fn is_live(&self) -> bool {
        !matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Failed
        )
    }
}

enum AfterDisconnect {
    Stay,
    Reconnect { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

struct Inner {
    config: RealtimeConfig,
    transport: Arc<dyn RealtimeTransport>,
    auth_token: Option<String>,
    listeners: ListenerRegistry,
    surface: Arc<dyn NotificationSurface>,
    connection: Mutex<Connection>,
}

/// Reconnecting, authenticating event-relay client.
///
/// Cloning is cheap and every clone drives the same connection. Dropping the
/// last clone closes the session and cancels any pending reconnect.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`ConnectionManager`].
#[derive(Clone)]
pub struct WeakConnectionManager {
    inner: Weak<Inner>,
}

impl WeakConnectionManager {
    /// The manager, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        self.inner.upgrade().map(|inner| ConnectionManager { inner })
    }
}

impl ConnectionManager {
    /// Create a manager that reports notifications to the log.
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn RealtimeTransport>,
        auth_token: Option<String>,
    ) -> Self {
        Self::with_surface(config, transport, auth_token, Arc::new(TracingSurface))
    }

    /// Create a manager with a custom notification surface.
    pub fn with_surface(
        config: RealtimeConfig,
        transport: Arc<dyn RealtimeTransport>,
        auth_token: Option<String>,
        surface: Arc<dyn NotificationSurface>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                auth_token,
                listeners: ListenerRegistry::new(),
                surface,
                connection: Mutex::new(Connection::new()),
            }),
        }
    }

    /// A handle that does not keep the connection alive.
    ///
    /// Listeners that drive the manager should capture this instead of a
    /// clone, otherwise the manager owns itself and is never dropped.
    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.lock().state
    }

    /// Check if the server has confirmed authentication on the current session.
    pub fn is_authenticated(&self) -> bool {
        self.inner.connection.lock().authenticated
    }

    /// Check if a session is open, authenticated or not.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected
                | ConnectionState::Authenticating
                | ConnectionState::Authenticated
        )
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.connection.lock().reconnect_attempts
    }

    pub fn status(&self) -> ConnectionStatus {
        let conn = self.inner.connection.lock();
        ConnectionStatus {
            state: conn.state,
            authenticated: conn.authenticated,
            reconnect_attempts: conn.reconnect_attempts,
        }
    }

    /// Register a listener for a server or lifecycle event.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.listeners.on(event, listener)
    }

    /// Unregister a listener.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.listeners.off(event, id)
    }

    /// Open the connection.
    ///
    /// Resets the reconnect counter and supersedes any pending reconnect.
    /// Returns immediately; progress is reported through listeners.
    pub fn connect(&self) {
        {
            let mut conn = self.inner.connection.lock();
            if conn.is_live() {
                debug!(state = ?conn.state, "Already connecting or connected");
                return;
            }
            if let Some(timer) = conn.reconnect_timer.take() {
                timer.abort();
            }
            conn.reconnect_attempts = 0;
        }
        self.inner.open();
    }

    /// Send the auth token on the current session.
    pub fn authenticate(&self) {
        self.inner.authenticate();
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) {
        let (session, was_active) = {
            let mut conn = self.inner.connection.lock();
            let had_timer = match conn.reconnect_timer.take() {
                Some(timer) => {
                    timer.abort();
                    true
                }
                None => false,
            };
            if let Some(pump) = conn.pump.take() {
                pump.abort();
            }
            let was_active = conn.is_live() || had_timer;
            conn.generation += 1;
            conn.state = ConnectionState::Disconnected;
            conn.authenticated = false;
            (conn.session.take(), was_active)
        };

        if let Some(session) = session {
            session.disconnect();
        }

        if was_active {
            info!("Disconnected from realtime server");
            self.inner.dispatch(
                local::DISCONNECTED,
                &Value::String(reason::CLIENT_DISCONNECT.to_string()),
            );
        }
    }

    /// Subscribe to all trade events.
    pub fn subscribe_to_trades(&self) {
        self.inner.send_command(Command::SubscribeTrades);
    }

    /// Subscribe to the current user's trade events.
    pub fn subscribe_to_user_trades(&self) {
        self.inner.send_command(Command::SubscribeUserTrades);
    }

    /// Subscribe to one trade.
    pub fn subscribe_to_trade(&self, trade_id: &str) {
        self.inner.send_command(Command::SubscribeTrade {
            trade_id: trade_id.to_string(),
        });
    }

    pub fn subscribe_to_kyc_updates(&self) {
        self.inner.send_command(Command::SubscribeKycUpdates);
    }

    pub fn join_room(&self, room: &str) {
        self.inner.send_command(Command::JoinRoom {
            room: room.to_string(),
        });
    }

    pub fn leave_room(&self, room: &str) {
        self.inner.send_command(Command::LeaveRoom {
            room: room.to_string(),
        });
    }

    /// Send a chat message to a room, optionally tagged with a trade.
    pub fn send_message(&self, room: &str, message: &str, trade_id: Option<&str>) {
        self.inner.send_command(Command::SendMessage {
            room: room.to_string(),
            message: message.to_string(),
            trade_id: trade_id.map(str::to_string),
        });
    }
}

impl Inner {
    /// Start a new connection generation and open the transport in the background.
    fn open(self: &Arc<Self>) {
        let (generation, old_session) = {
            let mut conn = self.connection.lock();
            conn.generation += 1;
            conn.state = ConnectionState::Connecting;
            conn.authenticated = false;
            if let Some(pump) = conn.pump.take() {
                pump.abort();
            }
            (conn.generation, conn.session.take())
        };
        if let Some(session) = old_session {
            session.disconnect();
        }

        info!(url = %self.config.url, generation, "Connecting to realtime server");

        let pump = tokio::spawn(run_connection(Arc::downgrade(self), generation));

        let mut conn = self.connection.lock();
        if conn.generation == generation {
            conn.pump = Some(pump);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.connection.lock().generation == generation
    }

    /// Returns false once the session is finished.
    fn handle_transport_event(self: &Arc<Self>, generation: u64, event: TransportEvent) -> bool {
        if !self.is_current(generation) {
            debug!(generation, "Ignoring event from superseded connection");
            return false;
        }

        match event {
            TransportEvent::Connected => self.handle_connected(generation),
            TransportEvent::Disconnected { reason } => {
                self.handle_disconnect(generation, reason);
                return false;
            }
            TransportEvent::Message { event, payload } => {
                self.handle_server_event(generation, &event, &payload)
            }
        }
        true
    }

    fn handle_connected(&self, generation: u64) {
        {
            let mut conn = self.connection.lock();
            if conn.generation != generation || conn.state != ConnectionState::Connecting {
                debug!(state = ?conn.state, "Ignoring duplicate connect signal");
                return;
            }
            conn.state = ConnectionState::Connected;
            conn.reconnect_attempts = 0;
        }
        info!(generation, "Connected to realtime server");

        self.authenticate();
        self.dispatch(local::CONNECTED, &Value::Null);
    }

    fn authenticate(&self) {
        let Some(token) = self.auth_token.as_deref() else {
            debug!("No auth token, skipping authentication");
            return;
        };

        let session = {
            let mut conn = self.connection.lock();
            match conn.state {
                ConnectionState::Connected | ConnectionState::Authenticating => {}
                ConnectionState::Authenticated => {
                    debug!("Already authenticated");
                    return;
                }
                _ => {
                    debug!(state = ?conn.state, "Not connected, cannot authenticate");
                    return;
                }
            }
            let Some(session) = conn.session.clone() else {
                return;
            };
            conn.state = ConnectionState::Authenticating;
            session
        };

        let command = Command::Authenticate {
            token: token.to_string(),
        };
        match session.emit(command.event_name(), command.payload()) {
            Ok(()) => debug!("Sent authenticate"),
            Err(e) => warn!(error = %e, "Failed to send authenticate"),
        }
    }

    fn handle_server_event(&self, generation: u64, event: &str, payload: &Value) {
        match event {
            server::AUTHENTICATED => {
                let mut conn = self.connection.lock();
                if conn.generation != generation {
                    return;
                }
                conn.state = ConnectionState::Authenticated;
                conn.authenticated = true;
                info!("Authenticated with realtime server");
            }
            server::AUTH_ERROR => {
                let mut conn = self.connection.lock();
                if conn.generation != generation {
                    return;
                }
                conn.state = ConnectionState::Connected;
                conn.authenticated = false;
                warn!(payload = %payload, "Realtime authentication failed");
            }
            server::ERROR => warn!(payload = %payload, "Realtime server error"),
            _ => debug!(event = %event, "Received server event"),
        }

        self.dispatch(event, payload);
    }

    fn handle_disconnect(self: &Arc<Self>, generation: u64, disconnect_reason: String) {
        let (next, session) = {
            let mut conn = self.connection.lock();
            if conn.generation != generation || !conn.is_live() {
                return;
            }
            conn.state = ConnectionState::Disconnected;
            conn.authenticated = false;
            conn.pump = None;
            let session = conn.session.take();

            let next = if disconnect_reason == reason::CLIENT_DISCONNECT {
                AfterDisconnect::Stay
            } else if conn.reconnect_attempts < self.config.max_reconnect_attempts {
                conn.reconnect_attempts += 1;
                let attempt = conn.reconnect_attempts;
                let delay = self.config.reconnect_delay(attempt);
                conn.reconnect_timer = Some(self.spawn_reconnect(generation, delay));
                AfterDisconnect::Reconnect { attempt, delay }
            } else {
                conn.state = ConnectionState::Failed;
                AfterDisconnect::GiveUp {
                    attempts: conn.reconnect_attempts,
                }
            };
            (next, session)
        };

        if let Some(session) = session {
            session.disconnect();
        }

        info!(reason = %disconnect_reason, "Realtime connection closed");
        self.dispatch(local::DISCONNECTED, &Value::String(disconnect_reason));

        match next {
            AfterDisconnect::Stay => {}
            AfterDisconnect::Reconnect { attempt, delay } => {
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
            }
            AfterDisconnect::GiveUp { attempts } => {
                // A `disconnected` listener may already have called `connect()`.
                let still_failed = {
                    let conn = self.connection.lock();
                    conn.generation == generation && conn.state == ConnectionState::Failed
                };
                if !still_failed {
                    debug!("Connection restarted before giving up, not reporting exhaustion");
                    return;
                }
                error!(attempts, "Max reconnect attempts reached");
                self.dispatch(
                    local::MAX_RECONNECT_ATTEMPTS,
                    &json!({ "attempts": attempts }),
                );
            }
        }
    }

    fn spawn_reconnect(self: &Arc<Self>, generation: u64, delay: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            {
                let mut conn = inner.connection.lock();
                if conn.generation != generation || conn.state != ConnectionState::Disconnected {
                    return;
                }
                conn.reconnect_timer = None;
            }
            inner.open();
        })
    }

    fn send_command(&self, command: Command) {
        let session = {
            let conn = self.connection.lock();
            if !conn.authenticated {
                debug!(command = command.event_name(), "Not authenticated, dropping command");
                return;
            }
            conn.session.clone()
        };
        let Some(session) = session else {
            return;
        };

        if let Err(e) = session.emit(command.event_name(), command.payload()) {
            warn!(error = %e, command = command.event_name(), "Failed to send command");
        }
    }

    /// Relay to listeners, then to the notification surface.
    fn dispatch(&self, event: &str, payload: &Value) {
        self.listeners.dispatch(event, payload);
        if let Some((message, severity)) = notification_for(event, payload) {
            self.surface.notify(&Notification::new(
                message,
                severity,
                self.config.notification_dismiss(),
            ));
        }
    }
}

/// Open the transport and feed its events through the state machine.
///
/// Holds the manager weakly so dropping every handle ends the connection.
async fn run_connection(manager: Weak<Inner>, generation: u64) {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let (transport, url, options) = match manager.upgrade() {
        Some(inner) => (
            inner.transport.clone(),
            inner.config.url.clone(),
            inner.config.transport_options(),
        ),
        None => return,
    };

    let opened = transport.open(&url, &options, events_tx).await;

    {
        let Some(inner) = manager.upgrade() else {
            if let Ok(session) = opened {
                session.disconnect();
            }
            return;
        };
        match opened {
            Ok(session) => {
                let session: Arc<dyn TransportSession> = Arc::from(session);
                let superseded = {
                    let mut conn = inner.connection.lock();
                    if conn.generation == generation {
                        conn.session = Some(session.clone());
                        false
                    } else {
                        true
                    }
                };
                if superseded {
                    debug!(generation, "Connection superseded while opening");
                    session.disconnect();
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, generation, "Failed to open realtime transport");
                inner.handle_disconnect(generation, format!("connect error: {e}"));
                return;
            }
        }
    }

    while let Some(event) = events_rx.recv().await {
        let Some(inner) = manager.upgrade() else {
            return;
        };
        if !inner.handle_transport_event(generation, event) {
            return;
        }
    }

    // Transport dropped its sender without reporting a disconnect.
    if let Some(inner) = manager.upgrade() {
        inner.handle_disconnect(generation, reason::TRANSPORT_CLOSE.to_string());
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let conn = self.connection.get_mut();
        if let Some(timer) = conn.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(pump) = conn.pump.take() {
            pump.abort();
        }
        if let Some(session) = conn.session.take() {
            debug!("Connection manager dropped, closing session");
            session.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_transport::WsTransport;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            RealtimeConfig::default(),
            Arc::new(WsTransport::new()),
            Some("token".to_string()),
        )
    }

    #[test]
    fn test_initial_state() {
        let manager = manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_authenticated());
        assert!(!manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&manager().status()).unwrap();
        assert!(json.contains("\"state\":\"disconnected\""));
        assert!(json.contains("\"authenticated\":false"));
        assert!(json.contains("\"reconnect_attempts\":0"));
    }

    #[test]
    fn test_disconnect_when_idle_is_quiet() {
        let manager = manager();
        let fired = Arc::new(Mutex::new(0));
        let fired_clone = fired.clone();
        manager.on(local::DISCONNECTED, move |_| *fired_clone.lock() += 1);

        manager.disconnect();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(*fired.lock(), 0);
    }

    #[test]
    fn test_commands_before_connect_are_dropped() {
        let manager = manager();
        manager.subscribe_to_trades();
        manager.join_room("room-1");
        manager.send_message("room-1", "hello", None);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_clones_share_listeners() {
        let manager = manager();
        let clone = manager.clone();
        let id = clone.on(server::NEW_TRADE, |_| {});
        assert!(manager.off(server::NEW_TRADE, id));
    }
}
