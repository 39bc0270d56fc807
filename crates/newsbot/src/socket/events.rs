//! Local event vocabulary and listener registry of the transport.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;

/// Event names a transport delivers to local subscribers.
///
/// `connection_status` and `connection_error` are synthesized by the
/// transport itself; `socket_error` is the server's generic `error` event;
/// the rest are forwarded from the server under their wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    ConnectionStatus,
    ConnectionError,
    SessionJoined,
    NewMessage,
    SessionHistory,
    SessionCleared,
    StatusUpdate,
    UserTyping,
    MessageError,
    SocketError,
}

impl EventName {
    pub const ALL: [EventName; 10] = [
        Self::ConnectionStatus,
        Self::ConnectionError,
        Self::SessionJoined,
        Self::NewMessage,
        Self::SessionHistory,
        Self::SessionCleared,
        Self::StatusUpdate,
        Self::UserTyping,
        Self::MessageError,
        Self::SocketError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionStatus => "connection_status",
            Self::ConnectionError => "connection_error",
            Self::SessionJoined => "session_joined",
            Self::NewMessage => "new_message",
            Self::SessionHistory => "session_history",
            Self::SessionCleared => "session_cleared",
            Self::StatusUpdate => "status_update",
            Self::UserTyping => "user_typing",
            Self::MessageError => "message_error",
            Self::SocketError => "socket_error",
        }
    }

    /// Map a server event name to the local name it is re-emitted under.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "error" => Some(Self::SocketError),
            // Lifecycle events are never accepted from the wire.
            "connection_status" | "connection_error" => None,
            other => other.parse().ok(),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event name: {0}")]
pub struct UnknownEvent(pub String);

/// Callback invoked with the raw event payload.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Multi-listener registry keyed by event name.
///
/// Listeners of one event run in registration order. The registry lock is
/// released before handlers run, so a handler may subscribe or unsubscribe.
#[derive(Default)]
pub struct EventBus {
    listeners: DashMap<EventName, Vec<(ListenerId, Handler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: EventName, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.entry(event).or_default().push((id, handler));
        id
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn off(&self, event: EventName, id: ListenerId) -> bool {
        let Some(mut handlers) = self.listeners.get_mut(&event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(lid, _)| *lid != id);
        before != handlers.len()
    }

    /// Invoke every listener of `event` with `data`.
    pub fn emit(&self, event: EventName, data: &Value) {
        let handlers: Vec<Handler> = match self.listeners.get(&event) {
            Some(entry) => entry.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };
        for handler in handlers {
            handler(data);
        }
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self, event: EventName) -> usize {
        self.listeners.get(&event).map(|h| h.len()).unwrap_or(0)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_names_round_trip() {
        for event in EventName::ALL {
            assert_eq!(event.as_str().parse::<EventName>().unwrap(), event);
        }
        assert!("bogus".parse::<EventName>().is_err());
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(EventName::from_wire("error"), Some(EventName::SocketError));
        assert_eq!(EventName::from_wire("new_message"), Some(EventName::NewMessage));
        assert_eq!(EventName::from_wire("connection_status"), None);
        assert_eq!(EventName::from_wire("whatever"), None);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.on(
                EventName::NewMessage,
                Arc::new(move |_| seen.lock().unwrap().push(tag)),
            );
        }
        bus.emit(EventName::NewMessage, &json!({}));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_off_removes_only_that_listener() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let a = {
            let count = Arc::clone(&count);
            bus.on(
                EventName::UserTyping,
                Arc::new(move |_| *count.lock().unwrap() += 1),
            )
        };
        let _b = {
            let count = Arc::clone(&count);
            bus.on(
                EventName::UserTyping,
                Arc::new(move |_| *count.lock().unwrap() += 10),
            )
        };

        assert!(bus.off(EventName::UserTyping, a));
        assert!(!bus.off(EventName::UserTyping, a));
        assert!(!bus.off(EventName::NewMessage, a));

        bus.emit(EventName::UserTyping, &Value::Null);
        assert_eq!(*count.lock().unwrap(), 10);
        assert_eq!(bus.listener_count(EventName::UserTyping), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let id_slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let id = {
            let inner = Arc::clone(&bus);
            let id_slot = Arc::clone(&id_slot);
            bus.on(
                EventName::SessionCleared,
                Arc::new(move |_| {
                    if let Some(id) = *id_slot.lock().unwrap() {
                        inner.off(EventName::SessionCleared, id);
                    }
                }),
            )
        };
        *id_slot.lock().unwrap() = Some(id);

        bus.emit(EventName::SessionCleared, &Value::Null);
        assert_eq!(bus.listener_count(EventName::SessionCleared), 0);
    }

    #[test]
    fn test_clear() {
        let bus = EventBus::new();
        bus.on(EventName::NewMessage, Arc::new(|_| {}));
        bus.on(EventName::StatusUpdate, Arc::new(|_| {}));
        bus.clear();
        assert_eq!(bus.listener_count(EventName::NewMessage), 0);
        assert_eq!(bus.listener_count(EventName::StatusUpdate), 0);
    }
}
