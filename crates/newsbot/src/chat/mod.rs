//! Session reconciliation: the client's authoritative view of the chat.

mod controller;
pub mod ledger;
pub mod sidebar;
pub mod typing;

pub use controller::{
    ChatController, GREETING, NEW_CHAT_GREETING, SEARCH_FAILED, SESSION_CLEARED, Update,
};
pub use sidebar::{ChatSession, PLACEHOLDER_TITLE};
