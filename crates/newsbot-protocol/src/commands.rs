//! Outbound commands (client -> server) on the realtime channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command the client can emit. Each maps to one named socket event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClientCommand {
    JoinSession(JoinSession),
    SendMessage(SendMessage),
    GetHistory(GetHistory),
    ClearSession(ClearSession),
    Typing(Typing),
}

impl ClientCommand {
    /// Socket event name the command is emitted under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinSession(_) => "join_session",
            Self::SendMessage(_) => "send_message",
            Self::GetHistory(_) => "get_history",
            Self::ClearSession(_) => "clear_session",
            Self::Typing(_) => "typing",
        }
    }

    /// JSON payload sent alongside the event name.
    pub fn payload(&self) -> Value {
        // Plain structs with string/bool/int fields cannot fail to serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSession {
    /// `None` asks the server to allocate a session.
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistory {
    pub session_id: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSession {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub session_id: String,
    pub is_typing: bool,
}
