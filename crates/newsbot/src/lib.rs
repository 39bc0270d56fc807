//! Headless client core for the RAG news chat backend.
//!
//! - [`socket`]: realtime transport (Socket.IO over WebSocket)
//! - [`connection`]: connection state derived from transport events
//! - [`chat`]: session reconciliation controller
//! - [`api`]: REST client used for session CRUD and as the send fallback

pub mod api;
pub mod chat;
pub mod config;
pub mod connection;
pub mod ids;
pub mod socket;

pub use api::{ApiClient, NewsApi, RequestError, RequestResult};
pub use chat::{ChatController, ChatSession};
pub use config::ClientConfig;
pub use connection::{ConnectionMonitor, ConnectionPhase, ConnectionState};
pub use socket::{EventName, SocketTransport, Transport};
