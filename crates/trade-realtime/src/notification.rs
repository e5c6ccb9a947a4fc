//! Transient user-facing notifications.
//!
//! The connection manager turns selected events into [`Notification`]s and
//! hands them to a [`NotificationSurface`]. Rendering (toasts, banners, log
//! lines) is up to the surface.

use crate::events::{local, server};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Parse a severity name, accepting `warn` and `danger` aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "success" => Some(Self::Success),
            "warning" | "warn" => Some(Self::Warning),
            "error" | "danger" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A message to show the user for a limited time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    /// How long the surface should keep it visible.
    pub dismiss_after: Duration,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity, dismiss_after: Duration) -> Self {
        Self {
            message: message.into(),
            severity,
            created_at: Utc::now(),
            dismiss_after,
        }
    }
}

/// Something that can display notifications.
pub trait NotificationSurface: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Surface that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSurface;

impl NotificationSurface for TracingSurface {
    fn notify(&self, notification: &Notification) {
        let message = notification.message.as_str();
        match notification.severity {
            Severity::Info => info!(severity = "info", "{message}"),
            Severity::Success => info!(severity = "success", "{message}"),
            Severity::Warning => warn!(severity = "warning", "{message}"),
            Severity::Error => error!(severity = "error", "{message}"),
        }
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Display text for an id-like field that may be a string or a number.
fn id_field(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Map an event to the message and severity shown to the user, if any.
pub fn notification_for(event: &str, payload: &Value) -> Option<(String, Severity)> {
    let mapped = match event {
        server::AUTHENTICATED => (
            "Connected to real-time updates".to_string(),
            Severity::Success,
        ),
        server::AUTH_ERROR => (
            str_field(payload, "message")
                .unwrap_or("Real-time authentication failed")
                .to_string(),
            Severity::Error,
        ),
        local::MAX_RECONNECT_ATTEMPTS => (
            "Unable to reach the real-time server".to_string(),
            Severity::Error,
        ),
        server::NEW_TRADE => (
            format!("New trade created: {}", id_field(payload, "tradeId")),
            Severity::Info,
        ),
        server::TRADE_UPDATE => {
            let trade = id_field(payload, "tradeId");
            let text = match str_field(payload, "status") {
                Some(status) => format!("Trade {trade} updated: {status}"),
                None => format!("Trade {trade} updated"),
            };
            (text, Severity::Info)
        }
        server::USER_NOTIFICATION => (
            str_field(payload, "message")?.to_string(),
            str_field(payload, "type")
                .and_then(Severity::parse)
                .unwrap_or(Severity::Info),
        ),
        server::KYC_STATUS_UPDATE => {
            let status = str_field(payload, "status").unwrap_or("updated");
            let severity = match status {
                "approved" | "verified" => Severity::Success,
                "rejected" => Severity::Error,
                _ => Severity::Info,
            };
            (format!("KYC status: {status}"), severity)
        }
        server::SYSTEM_MESSAGE => (
            str_field(payload, "message")?.to_string(),
            str_field(payload, "level")
                .and_then(Severity::parse)
                .unwrap_or(Severity::Info),
        ),
        server::ERROR => (
            str_field(payload, "message")
                .or_else(|| payload.as_str())
                .unwrap_or("Real-time server error")
                .to_string(),
            Severity::Error,
        ),
        _ => return None,
    };
    Some(mapped)
}
