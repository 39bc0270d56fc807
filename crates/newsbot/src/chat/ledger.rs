//! De-duplication ledger for incoming messages.

use std::collections::HashSet;

/// Identity of one delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    pub message_id: String,
    pub session_id: String,
    pub timestamp: String,
}

impl DeliveryKey {
    pub fn new(
        message_id: impl Into<String>,
        session_id: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            session_id: session_id.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Keys already processed for the active session.
///
/// Reset whenever the active session changes or its history is reloaded.
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<DeliveryKey>,
}

impl DedupLedger {
    pub fn contains(&self, key: &DeliveryKey) -> bool {
        self.seen.contains(key)
    }

    /// Record a key. Returns false if it was already present.
    pub fn insert(&mut self, key: DeliveryKey) -> bool {
        self.seen.insert(key)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
