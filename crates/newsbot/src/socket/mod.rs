//! Realtime transport adapter.
//!
//! Wraps the backend's Socket.IO channel behind a small local event API:
//! named events in, named commands out, and connection lifecycle reported
//! as `connection_status` / `connection_error` events.

pub mod events;
pub mod frame;
mod transport;

use newsbot_protocol::ClientCommand;
use newsbot_protocol::commands::{ClearSession, GetHistory, JoinSession, SendMessage, Typing};

pub use events::{EventBus, EventName, Handler, ListenerId, UnknownEvent};
pub use frame::{FrameError, Handshake, Packet, SocketPacket};
pub use transport::{
    REASON_PING_TIMEOUT, REASON_SERVER_DISCONNECT, REASON_TRANSPORT_CLOSE,
    REASON_TRANSPORT_ERROR, SocketTransport, TransportError, socket_endpoint,
};

/// Realtime channel as seen by the rest of the client.
///
/// All methods are non-blocking. Commands issued while disconnected are
/// dropped silently; the caller is expected to check [`is_connected`]
/// and fall back to REST where that matters.
///
/// [`is_connected`]: Transport::is_connected
pub trait Transport: Send + Sync {
    /// Open (or re-open) the connection. Registered listeners survive.
    fn connect(&self, url: &str);

    /// Close the connection and drop every listener. Safe to repeat.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    fn on(&self, event: EventName, handler: Handler) -> ListenerId;

    fn off(&self, event: EventName, id: ListenerId) -> bool;

    /// Emit a command to the server if connected.
    fn send_command(&self, command: ClientCommand);

    fn join_session(&self, session_id: Option<&str>) {
        self.send_command(ClientCommand::JoinSession(JoinSession {
            session_id: session_id.map(str::to_string),
        }));
    }

    fn send_message(&self, message: &str, session_id: &str) {
        self.send_command(ClientCommand::SendMessage(SendMessage {
            message: message.to_string(),
            session_id: session_id.to_string(),
        }));
    }

    fn get_history(&self, session_id: &str, limit: u32) {
        self.send_command(ClientCommand::GetHistory(GetHistory {
            session_id: session_id.to_string(),
            limit,
        }));
    }

    fn clear_session(&self, session_id: &str) {
        self.send_command(ClientCommand::ClearSession(ClearSession {
            session_id: session_id.to_string(),
        }));
    }

    fn set_typing(&self, session_id: &str, is_typing: bool) {
        self.send_command(ClientCommand::Typing(Typing {
            session_id: session_id.to_string(),
            is_typing,
        }));
    }
}
