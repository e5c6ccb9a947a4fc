//! Realtime event-relay client for the trade-finance platform.
//!
//! This crate provides:
//! - A connection manager that authenticates with an opaque token and
//!   reconnects with a linearly increasing delay
//! - A listener registry relaying named server events in registration order
//! - Outbound commands gated on authentication
//! - A WebSocket transport and a transport trait for alternatives
//! - Notification mapping for user-facing toasts

mod client;
mod config;
mod error;
pub mod events;
mod listeners;
mod messages;
pub mod notification;
mod paths;
mod storage;
pub mod transport;
mod ws_transport;

#[cfg(test)]
mod tests;

pub use client::{ConnectionManager, ConnectionState, ConnectionStatus, WeakConnectionManager};
pub use config::{RealtimeConfig, DEFAULT_LOG_LEVEL, DEFAULT_REALTIME_URL};
pub use error::{RealtimeError, RealtimeResult};
pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use messages::{Command, Frame};
pub use notification::{Notification, NotificationSurface, Severity, TracingSurface};
pub use paths::Paths;
pub use storage::{load_auth_token, FileStore, KeyValueStore, MemoryStore, StorageKeys};
pub use transport::{
    RealtimeTransport, TransportEvent, TransportEventSender, TransportOptions, TransportSession,
};
pub use ws_transport::WsTransport;
