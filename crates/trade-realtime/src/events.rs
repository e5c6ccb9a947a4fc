//! Event names used on the realtime channel.
//!
//! Inbound names are what the server emits; `local` names are raised by the
//! connection manager itself.

/// Events emitted by the realtime server.
pub mod server {
    pub const AUTHENTICATED: &str = "authenticated";
    pub const AUTH_ERROR: &str = "auth_error";
    pub const NEW_TRADE: &str = "new_trade";
    pub const TRADE_UPDATE: &str = "trade_update";
    pub const USER_NOTIFICATION: &str = "user_notification";
    pub const KYC_STATUS_UPDATE: &str = "kyc_status_update";
    pub const SYSTEM_MESSAGE: &str = "system_message";
    pub const JOINED_ROOM: &str = "joined_room";
    pub const LEFT_ROOM: &str = "left_room";
    pub const SUBSCRIBED: &str = "subscribed";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const ERROR: &str = "error";
}

/// Lifecycle events raised locally by the connection manager.
pub mod local {
    pub const CONNECTED: &str = "connected";
    pub const DISCONNECTED: &str = "disconnected";
    pub const MAX_RECONNECT_ATTEMPTS: &str = "max_reconnect_attempts";
}

/// Commands sent to the server.
pub mod outbound {
    pub const AUTHENTICATE: &str = "authenticate";
    pub const SUBSCRIBE_TRADES: &str = "subscribe_trades";
    pub const SUBSCRIBE_USER_TRADES: &str = "subscribe_user_trades";
    pub const SUBSCRIBE_TRADE: &str = "subscribe_trade";
    pub const SUBSCRIBE_KYC_UPDATES: &str = "subscribe_kyc_updates";
    pub const JOIN_ROOM: &str = "join_room";
    pub const LEAVE_ROOM: &str = "leave_room";
    pub const SEND_MESSAGE: &str = "send_message";
}

/// Disconnect reasons reported by transports.
pub mod reason {
    /// Deliberate close requested by this client. Never triggers a reconnect.
    pub const CLIENT_DISCONNECT: &str = "io client disconnect";
    pub const SERVER_DISCONNECT: &str = "io server disconnect";
    pub const TRANSPORT_CLOSE: &str = "transport close";
    pub const TRANSPORT_ERROR: &str = "transport error";
    pub const PING_TIMEOUT: &str = "ping timeout";
}
