//! WebSocket message protocol definitions.
//!
//! All messages are JSON-encoded and use snake_case for field names.

use clinic_engine::Change;
use serde::{Deserialize, Serialize};

use crate::service::SyncStatus;

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for the current sync status.
    Status {
        /// Request ID for correlating responses
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Keep-alive ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the connection is accepted.
    Welcome { tenant_id: String, user_id: String },

    /// A record of the client's clinic changed.
    Changed { change: Change },

    /// Response to a status request.
    Status {
        status: SyncStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error {
        /// Error description
        message: String,
        /// Request ID from the original request (if applicable)
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_engine::ChangeKind;

    #[test]
    fn client_messages_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "status", "request_id": "r-1"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Status { request_id: Some(ref id) } if id == "r-1"
        ));

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn changed_carries_the_change() {
        let msg = ServerMessage::Changed {
            change: Change {
                tenant_id: "acme".into(),
                collection: "patients",
                id: "p-1".into(),
                kind: ChangeKind::Created,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "changed");
        assert_eq!(json["change"]["collection"], "patients");
        assert_eq!(json["change"]["tenantId"], "acme");
    }

    #[test]
    fn pong_and_error_serialize() {
        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
        let json = serde_json::to_string(&ServerMessage::error("nope", None)).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"nope"}"#);
    }
}
