//! Connection state derived from transport lifecycle events.

use std::sync::Arc;

use log::{debug, info};
use serde_json::Value;
use tokio::sync::watch;

use newsbot_protocol::events::{ConnectionError, ConnectionStatus};

use crate::socket::{EventName, ListenerId, Transport};

/// Coarse phase of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Monitor closed; nothing is being attempted.
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Snapshot published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Last disconnect reason or connection error, cleared on connect.
    pub error: Option<String>,
}

impl ConnectionState {
    fn connecting() -> Self {
        Self {
            phase: ConnectionPhase::Connecting,
            error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.phase == ConnectionPhase::Connecting
    }
}

/// Watches a transport and keeps a [`ConnectionState`] current.
///
/// Starting the monitor immediately starts a connection attempt. Closing it
/// (explicitly or by drop) unsubscribes its handlers before disconnecting
/// the transport, so no lifecycle event reaches a closed monitor.
pub struct ConnectionMonitor {
    transport: Arc<dyn Transport>,
    url: String,
    state: Arc<watch::Sender<ConnectionState>>,
    listeners: Vec<(EventName, ListenerId)>,
}

impl ConnectionMonitor {
    pub fn start(transport: Arc<dyn Transport>, url: impl Into<String>) -> Self {
        let url = url.into();
        let (state, _) = watch::channel(ConnectionState::connecting());
        let state = Arc::new(state);

        let on_status = {
            let state = Arc::clone(&state);
            transport.on(
                EventName::ConnectionStatus,
                Arc::new(move |data: &Value| apply_status(&state, data)),
            )
        };
        let on_error = {
            let state = Arc::clone(&state);
            transport.on(
                EventName::ConnectionError,
                Arc::new(move |data: &Value| apply_error(&state, data)),
            )
        };

        transport.connect(&url);

        Self {
            transport,
            url,
            state,
            listeners: vec![
                (EventName::ConnectionStatus, on_status),
                (EventName::ConnectionError, on_error),
            ],
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start a fresh connection attempt.
    pub fn reconnect(&self) {
        if self.listeners.is_empty() {
            debug!("reconnect ignored: monitor closed");
            return;
        }
        info!("reconnecting to {}", self.url);
        self.state.send_replace(ConnectionState::connecting());
        self.transport.connect(&self.url);
    }

    /// Unsubscribe, then disconnect. Repeat calls do nothing.
    pub fn close(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        for (event, id) in self.listeners.drain(..) {
            self.transport.off(event, id);
        }
        self.transport.disconnect();
        self.state.send_replace(ConnectionState {
            phase: ConnectionPhase::Idle,
            error: None,
        });
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.close();
    }
}

fn apply_status(state: &watch::Sender<ConnectionState>, data: &Value) {
    let Ok(status) = serde_json::from_value::<ConnectionStatus>(data.clone()) else {
        debug!("ignoring malformed connection_status: {}", data);
        return;
    };
    let next = if status.connected {
        ConnectionState {
            phase: ConnectionPhase::Connected,
            error: None,
        }
    } else {
        ConnectionState {
            phase: ConnectionPhase::Disconnected,
            error: status.reason,
        }
    };
    state.send_replace(next);
}

fn apply_error(state: &watch::Sender<ConnectionState>, data: &Value) {
    let error = serde_json::from_value::<ConnectionError>(data.clone())
        .map(|e| e.error)
        .unwrap_or_else(|_| "connection error".to_string());
    state.send_replace(ConnectionState {
        phase: ConnectionPhase::Disconnected,
        error: Some(error),
    });
}
