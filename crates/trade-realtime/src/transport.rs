//! Realtime transport abstraction.
//!
//! The connection manager only talks to the server through these traits, so
//! the state machine can run against the WebSocket transport in production
//! and a scripted transport in tests.

use crate::RealtimeResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Signals a transport delivers to the connection manager, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link is established.
    Connected,
    /// The link is gone.
    Disconnected { reason: String },
    /// A named server event.
    Message { event: String, payload: Value },
}

/// Channel the transport uses to deliver [`TransportEvent`]s.
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Options passed to [`RealtimeTransport::open`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// How long to wait for the link before giving up.
    pub connect_timeout: Duration,
    /// Keepalive interval.
    pub ping_interval: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(20_000),
            ping_interval: Duration::from_secs(25),
        }
    }
}

/// Opens sessions against a realtime server.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Open a session.
    ///
    /// An `Err` is a synchronous open failure. Failures after the session is
    /// returned are reported as [`TransportEvent::Disconnected`] on `events`.
    async fn open(
        &self,
        url: &str,
        options: &TransportOptions,
        events: TransportEventSender,
    ) -> RealtimeResult<Box<dyn TransportSession>>;
}

/// One open session.
pub trait TransportSession: Send + Sync {
    /// Queue a named event for the server.
    fn emit(&self, event: &str, payload: Value) -> RealtimeResult<()>;

    /// Sever the session. Idempotent.
    fn disconnect(&self);
}
