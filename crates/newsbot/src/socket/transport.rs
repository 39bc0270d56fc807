//! WebSocket transport with automatic reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use newsbot_protocol::ClientCommand;

use super::Transport;
use super::events::{EventBus, EventName, Handler, ListenerId};
use super::frame::{Handshake, Packet, SocketPacket};
use crate::config::ReconnectConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Disconnect reasons reported in `connection_status`.
pub const REASON_SERVER_DISCONNECT: &str = "io server disconnect";
pub const REASON_TRANSPORT_CLOSE: &str = "transport close";
pub const REASON_TRANSPORT_ERROR: &str = "transport error";
pub const REASON_PING_TIMEOUT: &str = "ping timeout";

/// Failures of a single connection attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(String),

    #[error("timeout")]
    Timeout,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection rejected by server: {0}")]
    Rejected(String),
}

/// Build the Engine.IO WebSocket endpoint for a backend host URL.
pub fn socket_endpoint(url: &str) -> String {
    let base = url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/socket.io/?EIO=4&transport=websocket")
}

/// One live connection task and the handles needed to drive and stop it.
struct Link {
    outbound: mpsc::UnboundedSender<Packet>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Link {
    fn shutdown(self) {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        // The task exits on its own after sending a disconnect frame.
        drop(self.task);
    }
}

/// Realtime transport speaking Socket.IO over a WebSocket.
///
/// Owns the reconnection policy. Connection outcomes are reported only
/// through `connection_status` / `connection_error` events. Construct one
/// per application and share it behind an `Arc`.
pub struct SocketTransport {
    policy: ReconnectConfig,
    bus: Arc<EventBus>,
    link: Mutex<Option<Link>>,
}

impl SocketTransport {
    pub fn new(policy: ReconnectConfig) -> Self {
        Self {
            policy,
            bus: Arc::new(EventBus::new()),
            link: Mutex::new(None),
        }
    }

    fn take_link(&self) -> Option<Link> {
        match self.link.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn store_link(&self, link: Link) {
        match self.link.lock() {
            Ok(mut guard) => *guard = Some(link),
            Err(poisoned) => *poisoned.into_inner() = Some(link),
        }
    }
}

impl Transport for SocketTransport {
    fn connect(&self, url: &str) {
        if let Some(old) = self.take_link() {
            debug!("tearing down previous connection before reconnecting");
            old.shutdown();
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!("cannot connect outside an async runtime: {}", e);
                self.bus.emit(
                    EventName::ConnectionError,
                    &json!({ "error": "no async runtime" }),
                );
                return;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let ctx = LinkContext {
            endpoint: socket_endpoint(url),
            policy: self.policy.clone(),
            bus: Arc::clone(&self.bus),
            connected: Arc::clone(&connected),
            cancel: cancel.clone(),
        };
        info!("connecting to {}", ctx.endpoint);
        let task = runtime.spawn(run_link(ctx, outbound_rx));

        self.store_link(Link {
            outbound: outbound_tx,
            connected,
            cancel,
            task,
        });
    }

    fn disconnect(&self) {
        if let Some(link) = self.take_link() {
            info!("disconnecting realtime transport");
            link.shutdown();
        }
        self.bus.clear();
    }

    fn is_connected(&self) -> bool {
        let guard = match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .as_ref()
            .is_some_and(|link| link.connected.load(Ordering::SeqCst))
    }

    fn on(&self, event: EventName, handler: Handler) -> ListenerId {
        self.bus.on(event, handler)
    }

    fn off(&self, event: EventName, id: ListenerId) -> bool {
        self.bus.off(event, id)
    }

    fn send_command(&self, command: ClientCommand) {
        let guard = match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(link) if link.connected.load(Ordering::SeqCst) => {
                debug!("emitting {}", command.event_name());
                let packet = Packet::event(command.event_name(), command.payload());
                if link.outbound.send(packet).is_err() {
                    debug!("connection task gone, dropped {}", command.event_name());
                }
            }
            _ => debug!("not connected, dropped {}", command.event_name()),
        }
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(link) = self.take_link() {
            link.shutdown();
        }
    }
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("policy", &self.policy)
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ============================================================================
// Connection task
// ============================================================================

struct LinkContext {
    endpoint: String,
    policy: ReconnectConfig,
    bus: Arc<EventBus>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

/// Connect, pump, and reconnect until cancelled, told off by the server,
/// or out of attempts.
async fn run_link(ctx: LinkContext, mut outbound: mpsc::UnboundedReceiver<Packet>) {
    let mut failures: u32 = 0;

    loop {
        let attempt = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            result = timeout(ctx.policy.connect_timeout(), open_session(&ctx.endpoint)) => {
                result.unwrap_or(Err(TransportError::Timeout))
            }
        };

        match attempt {
            Ok((stream, handshake)) => {
                failures = 0;
                // Anything queued against an earlier connection is stale.
                while outbound.try_recv().is_ok() {}

                info!("realtime connection established (sid {})", handshake.sid);
                ctx.connected.store(true, Ordering::SeqCst);
                ctx.bus
                    .emit(EventName::ConnectionStatus, &json!({ "connected": true }));

                let reason = pump(stream, &handshake, &ctx, &mut outbound).await;
                ctx.connected.store(false, Ordering::SeqCst);

                let Some(reason) = reason else {
                    return;
                };
                warn!("realtime connection lost: {}", reason);
                ctx.bus.emit(
                    EventName::ConnectionStatus,
                    &json!({ "connected": false, "reason": reason }),
                );
                if reason == REASON_SERVER_DISCONNECT {
                    // The server ended the session on purpose; only an
                    // explicit connect may bring it back.
                    return;
                }
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "realtime connect attempt {} to {} failed: {}",
                    failures, ctx.endpoint, e
                );
                ctx.bus
                    .emit(EventName::ConnectionError, &json!({ "error": e.to_string() }));

                // One initial attempt plus `max_attempts` retries.
                if failures > ctx.policy.max_attempts {
                    warn!(
                        "giving up on {} after {} attempts",
                        ctx.endpoint, failures
                    );
                    return;
                }
            }
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = sleep(ctx.policy.delay()) => {}
        }
    }
}

/// Open the WebSocket and complete the Engine.IO + Socket.IO handshakes.
async fn open_session(endpoint: &str) -> Result<(WsStream, Handshake), TransportError> {
    let (mut stream, _) = connect_async(endpoint)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let handshake = match next_packet(&mut stream).await? {
        Packet::Open(handshake) => handshake,
        other => {
            return Err(TransportError::Handshake(format!(
                "expected open packet, got {other:?}"
            )));
        }
    };

    send_packet(&mut stream, &Packet::Message(SocketPacket::Connect(None)))
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    loop {
        match next_packet(&mut stream).await? {
            Packet::Message(SocketPacket::Connect(_)) => return Ok((stream, handshake)),
            Packet::Message(SocketPacket::ConnectError(data)) => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string());
                return Err(TransportError::Rejected(message));
            }
            Packet::Ping => {
                send_packet(&mut stream, &Packet::Pong)
                    .await
                    .map_err(|e| TransportError::Handshake(e.to_string()))?;
            }
            other => debug!("ignoring {:?} during handshake", other),
        }
    }
}

async fn next_packet(stream: &mut WsStream) -> Result<Packet, TransportError> {
    loop {
        let msg = stream
            .next()
            .await
            .ok_or_else(|| TransportError::Handshake("connection closed".into()))?
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        match msg {
            WsMessage::Text(text) => {
                return Packet::decode(text.as_str())
                    .map_err(|e| TransportError::Handshake(e.to_string()));
            }
            WsMessage::Close(_) => {
                return Err(TransportError::Handshake("connection closed".into()));
            }
            _ => continue,
        }
    }
}

async fn send_packet(
    stream: &mut WsStream,
    packet: &Packet,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    stream.send(WsMessage::Text(packet.encode().into())).await
}

/// Shuttle frames until the connection ends. Returns the disconnect reason,
/// or `None` when the link was cancelled locally.
async fn pump(
    stream: WsStream,
    handshake: &Handshake,
    ctx: &LinkContext,
    outbound: &mut mpsc::UnboundedReceiver<Packet>,
) -> Option<&'static str> {
    let (mut write, mut read) = stream.split();
    let liveness = handshake.liveness_timeout();
    let mut deadline = Instant::now() + liveness;

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let disconnect = Packet::Message(SocketPacket::Disconnect).encode();
                let _ = write.send(WsMessage::Text(disconnect.into())).await;
                let _ = write.close().await;
                return None;
            }
            packet = outbound.recv() => {
                let Some(packet) = packet else {
                    return None;
                };
                if let Err(e) = write.send(WsMessage::Text(packet.encode().into())).await {
                    warn!("realtime write failed: {}", e);
                    return Some(REASON_TRANSPORT_ERROR);
                }
            }
            _ = sleep_until(deadline) => {
                return Some(REASON_PING_TIMEOUT);
            }
            msg = read.next() => {
                deadline = Instant::now() + liveness;
                match msg {
                    None | Some(Ok(WsMessage::Close(_))) => return Some(REASON_TRANSPORT_CLOSE),
                    Some(Err(e)) => {
                        warn!("realtime read failed: {}", e);
                        return Some(REASON_TRANSPORT_ERROR);
                    }
                    Some(Ok(WsMessage::Text(text))) => match Packet::decode(text.as_str()) {
                        Ok(Packet::Ping) => {
                            if write.send(WsMessage::Text(Packet::Pong.encode().into())).await.is_err() {
                                return Some(REASON_TRANSPORT_ERROR);
                            }
                        }
                        Ok(Packet::Close) | Ok(Packet::Message(SocketPacket::Disconnect)) => {
                            return Some(REASON_SERVER_DISCONNECT);
                        }
                        Ok(Packet::Message(SocketPacket::Event { name, data })) => {
                            dispatch(&ctx.bus, &name, &data);
                        }
                        Ok(other) => debug!("ignoring frame {:?}", other),
                        Err(e) => warn!("skipping malformed frame: {}", e),
                    },
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Re-emit a server event verbatim to local subscribers.
fn dispatch(bus: &EventBus, name: &str, data: &Value) {
    match EventName::from_wire(name) {
        Some(event) => {
            debug!("received {}", event);
            bus.emit(event, data);
        }
        None => debug!("ignoring unknown server event {}", name),
    }
}
