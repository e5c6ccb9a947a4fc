//! Realtime wire frames and outbound commands.

use crate::events::outbound;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single frame on the realtime channel: a named event with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    /// Create a new frame.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Commands the client can send to the realtime server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Authenticate { token: String },
    SubscribeTrades,
    SubscribeUserTrades,
    SubscribeTrade { trade_id: String },
    SubscribeKycUpdates,
    JoinRoom { room: String },
    LeaveRoom { room: String },
    SendMessage {
        room: String,
        message: String,
        trade_id: Option<String>,
    },
}

impl Command {
    /// Event name this command is emitted under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Command::Authenticate { .. } => outbound::AUTHENTICATE,
            Command::SubscribeTrades => outbound::SUBSCRIBE_TRADES,
            Command::SubscribeUserTrades => outbound::SUBSCRIBE_USER_TRADES,
            Command::SubscribeTrade { .. } => outbound::SUBSCRIBE_TRADE,
            Command::SubscribeKycUpdates => outbound::SUBSCRIBE_KYC_UPDATES,
            Command::JoinRoom { .. } => outbound::JOIN_ROOM,
            Command::LeaveRoom { .. } => outbound::LEAVE_ROOM,
            Command::SendMessage { .. } => outbound::SEND_MESSAGE,
        }
    }

    /// JSON payload sent with the command.
    pub fn payload(&self) -> Value {
        match self {
            Command::Authenticate { token } => json!({ "token": token }),
            Command::SubscribeTrades
            | Command::SubscribeUserTrades
            | Command::SubscribeKycUpdates => Value::Null,
            Command::SubscribeTrade { trade_id } => json!({ "tradeId": trade_id }),
            Command::JoinRoom { room } | Command::LeaveRoom { room } => json!({ "room": room }),
            Command::SendMessage {
                room,
                message,
                trade_id,
            } => json!({
                "room": room,
                "message": message,
                "tradeId": trade_id,
            }),
        }
    }

    /// Build the wire frame for this command.
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.event_name(), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_frame() {
        let json = Command::Authenticate {
            token: "abc".to_string(),
        }
        .to_frame()
        .to_json()
        .unwrap();

        assert!(json.contains("\"event\":\"authenticate\""));
        assert!(json.contains("\"token\":\"abc\""));
    }

    #[test]
    fn test_payloadless_command_omits_data() {
        let json = Command::SubscribeTrades.to_frame().to_json().unwrap();
        assert_eq!(json, r#"{"event":"subscribe_trades"}"#);
    }

    #[test]
    fn test_subscribe_trade_uses_camel_case_id() {
        let payload = Command::SubscribeTrade {
            trade_id: "T-42".to_string(),
        }
        .payload();
        assert_eq!(payload["tradeId"], "T-42");
    }

    #[test]
    fn test_send_message_without_trade_id() {
        let payload = Command::SendMessage {
            room: "trade-7".to_string(),
            message: "docs uploaded".to_string(),
            trade_id: None,
        }
        .payload();

        assert_eq!(payload["room"], "trade-7");
        assert_eq!(payload["message"], "docs uploaded");
        assert!(payload["tradeId"].is_null());
    }

    #[test]
    fn test_deserialize_server_frame() {
        let frame = Frame::from_json(r#"{"event":"trade_update","data":{"tradeId":"T-1"}}"#)
            .unwrap();
        assert_eq!(frame.event, "trade_update");
        assert_eq!(frame.data["tradeId"], "T-1");
    }

    #[test]
    fn test_deserialize_frame_without_data() {
        let frame = Frame::from_json(r#"{"event":"authenticated"}"#).unwrap();
        assert_eq!(frame.event, "authenticated");
        assert!(frame.data.is_null());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Command::SubscribeUserTrades.event_name(), "subscribe_user_trades");
        assert_eq!(Command::SubscribeKycUpdates.event_name(), "subscribe_kyc_updates");
        assert_eq!(
            Command::LeaveRoom {
                room: "r".to_string()
            }
            .event_name(),
            "leave_room"
        );
    }

    #[test]
    fn test_malformed_frame_is_error() {
        assert!(Frame::from_json(r#"{"data":{}}"#).is_err());
        assert!(Frame::from_json("not json").is_err());
    }
}
