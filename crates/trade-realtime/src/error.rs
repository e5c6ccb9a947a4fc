//! Realtime error types.

use thiserror::Error;

/// Realtime client error type.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timed out opening the transport
    #[error("Connection timed out after {0} ms")]
    Timeout(u64),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Key-value store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Not connected error
    #[error("Not connected to realtime server")]
    NotConnected,

    /// Send error
    #[error("Failed to send message: {0}")]
    Send(String),
}

/// Result type alias using RealtimeError.
pub type RealtimeResult<T> = Result<T, RealtimeError>;
