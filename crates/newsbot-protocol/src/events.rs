//! Inbound event payloads (server -> client) on the realtime channel.
//!
//! The transport hands payloads over as raw JSON; consumers decode them into
//! these types when they need to.

use serde::{Deserialize, Serialize};

use crate::messages::Message;

/// Transport lifecycle change, produced locally by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Connection attempt failure, produced locally by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionError {
    pub error: String,
}

/// The server accepted a join and sent the session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionJoined {
    pub session_id: String,
    #[serde(default)]
    pub history: Vec<Message>,
}

/// A message for some session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(flatten)]
    pub message: Message,
    /// Absent when the server means the session the socket joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Reply to a `get_history` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    #[serde(default)]
    pub history: Option<Vec<Message>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCleared {
    pub session_id: String,
}

/// Progress note for a long-running server operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub message: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub user_id: String,
    pub is_typing: bool,
}

/// Error reported by the server, either as `message_error` or as a
/// generic socket `error`. Backends use `error` and `message` interchangeably.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerError {
    /// The human-readable error text, if the server sent one.
    pub fn text(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageKind;
    use serde_json::json;

    #[test]
    fn test_new_message_flattens_session_id() {
        let event: NewMessage = serde_json::from_value(json!({
            "id": 42,
            "type": "assistant",
            "sender": "assistant",
            "content": "answer",
            "timestamp": "2024-06-10T10:00:00Z",
            "sessionId": "s1"
        }))
        .unwrap();
        assert_eq!(event.session_id.as_deref(), Some("s1"));
        assert_eq!(event.message.id, "42");
        assert_eq!(event.message.kind, MessageKind::Assistant);
    }

    #[test]
    fn test_status_update_defaults_visible() {
        let update: StatusUpdate =
            serde_json::from_value(json!({"message": "Searching..."})).unwrap();
        assert!(update.visible);
    }

    #[test]
    fn test_server_error_text_prefers_error() {
        let err: ServerError =
            serde_json::from_value(json!({"error": "boom", "message": "other"})).unwrap();
        assert_eq!(err.text(), Some("boom"));

        let err: ServerError = serde_json::from_value(json!({"message": "only"})).unwrap();
        assert_eq!(err.text(), Some("only"));

        let err: ServerError = serde_json::from_value(json!({"error": ""})).unwrap();
        assert_eq!(err.text(), None);
    }

    #[test]
    fn test_session_joined_without_history() {
        let joined: SessionJoined =
            serde_json::from_value(json!({"sessionId": "abc"})).unwrap();
        assert!(joined.history.is_empty());
    }
}
