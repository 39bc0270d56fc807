//! Wire types for the news chat backend.
//!
//! - [`messages`]: conversation messages and retrieval metadata
//! - [`events`]: payloads of server-to-client realtime events
//! - [`commands`]: client-to-server realtime commands
//! - [`rest`]: REST request/response bodies

pub mod commands;
pub mod events;
pub mod messages;
pub mod rest;

pub use commands::ClientCommand;
pub use messages::{ArticleDetails, Message, MessageKind, SearchMetadata, Source};
