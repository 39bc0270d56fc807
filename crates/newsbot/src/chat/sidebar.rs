//! Sidebar session list.

use newsbot_protocol::MessageKind;
use newsbot_protocol::rest::SessionSummary;

use crate::ids::display_time;

/// Title of a session that has not been named from its content yet.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

pub const TITLE_MAX_CHARS: usize = 30;
pub const PREVIEW_MAX_CHARS: usize = 50;

const ELLIPSIS: &str = "...";

/// Shorten `text` to `max` characters, marking the cut with `...`.
///
/// Text at or under the limit is returned unchanged.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// One sidebar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    /// Preview of the latest message, at most 50 chars plus `...`.
    pub last_message: String,
    /// Display label of the latest activity.
    pub timestamp: String,
    pub message_count: u64,
}

impl ChatSession {
    /// Fresh, untitled entry.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: PLACEHOLDER_TITLE.to_string(),
            last_message: String::new(),
            timestamp: "now".to_string(),
            message_count: 0,
        }
    }

    pub fn from_summary(summary: &SessionSummary) -> Self {
        let title = summary
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| truncate_chars(t, TITLE_MAX_CHARS))
            .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());
        let last_message = summary
            .last_message
            .as_deref()
            .map(|m| truncate_chars(m, PREVIEW_MAX_CHARS))
            .unwrap_or_default();
        let timestamp = summary
            .last_activity
            .as_deref()
            .and_then(display_time)
            .unwrap_or_default();

        Self {
            id: summary.session_id.clone(),
            title,
            last_message,
            timestamp,
            message_count: summary.message_count,
        }
    }

    /// Update preview and label; name the session after its first user
    /// message while it still carries the placeholder title.
    fn preview(&mut self, content: &str, kind: MessageKind, timestamp: &str) {
        self.last_message = truncate_chars(content, PREVIEW_MAX_CHARS);
        self.timestamp = display_time(timestamp).unwrap_or_else(|| "now".to_string());
        if kind == MessageKind::User && self.title == PLACEHOLDER_TITLE {
            let title = content.trim();
            if !title.is_empty() {
                self.title = truncate_chars(title, TITLE_MAX_CHARS);
            }
        }
    }
}

/// Ordered sidebar list, most recently created first.
#[derive(Debug, Default)]
pub struct SessionList {
    entries: Vec<ChatSession>,
}

impl SessionList {
    pub fn entries(&self) -> &[ChatSession] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn first_id(&self) -> Option<&str> {
        self.entries.first().map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert at the top, replacing any entry with the same id.
    pub fn push_front(&mut self, entry: ChatSession) {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.insert(0, entry);
    }

    /// Make sure an entry exists for `id`.
    pub fn ensure(&mut self, id: &str) {
        if !self.contains(id) {
            self.push_front(ChatSession::placeholder(id));
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<ChatSession> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(idx))
    }

    /// Show `content` as the latest activity of a session without counting
    /// it as a stored message.
    pub fn preview(&mut self, id: &str, content: &str, kind: MessageKind, timestamp: &str) {
        self.ensure(id);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.preview(content, kind, timestamp);
        }
    }

    /// Account for a message that was added to a session.
    pub fn record(&mut self, id: &str, content: &str, kind: MessageKind, timestamp: &str) {
        self.preview(id, content, kind, timestamp);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.message_count += 1;
        }
    }

    /// Replace the list with the server's view, keeping the active entry
    /// when the server does not know it yet.
    pub fn replace_from_server(&mut self, summaries: &[SessionSummary], active: &str) {
        let mut entries: Vec<ChatSession> =
            summaries.iter().map(ChatSession::from_summary).collect();
        if !entries.iter().any(|e| e.id == active) {
            let local = self
                .remove(active)
                .unwrap_or_else(|| ChatSession::placeholder(active));
            entries.insert(0, local);
        }
        self.entries = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 50), "short");
        let exact = "x".repeat(50);
        assert_eq!(truncate_chars(&exact, 50), exact);
        let long = "y".repeat(51);
        let cut = truncate_chars(&long, 50);
        assert_eq!(cut.chars().count(), 53);
        assert!(cut.ends_with("..."));
        // Counted in characters, not bytes.
        let umlauts = "ü".repeat(40);
        assert_eq!(truncate_chars(&umlauts, 30), format!("{}...", "ü".repeat(30)));
    }

    #[test]
    fn test_preview_names_placeholder_from_user_message() {
        let mut list = SessionList::default();
        list.push_front(ChatSession::placeholder("s1"));

        list.preview("s1", "Hello there", MessageKind::Assistant, "");
        assert_eq!(list.get("s1").unwrap().title, PLACEHOLDER_TITLE);

        list.preview(
            "s1",
            "What happened with the electric vehicle market this week?",
            MessageKind::User,
            "",
        );
        let entry = list.get("s1").unwrap();
        assert_eq!(entry.title, "What happened with the electri...");
        assert_eq!(entry.message_count, 0);

        list.record("s1", "Something else entirely", MessageKind::User, "");
        let entry = list.get("s1").unwrap();
        assert_eq!(entry.title, "What happened with the electri...");
        assert_eq!(entry.last_message, "Something else entirely");
        assert_eq!(entry.message_count, 1);
    }

    #[test]
    fn test_preview_creates_missing_entry() {
        let mut list = SessionList::default();
        list.record("s9", "hi", MessageKind::User, "");
        assert_eq!(list.first_id(), Some("s9"));
        assert_eq!(list.get("s9").unwrap().title, "hi");
    }

    #[test]
    fn test_push_front_replaces_same_id() {
        let mut list = SessionList::default();
        list.push_front(ChatSession::placeholder("a"));
        list.push_front(ChatSession::placeholder("b"));
        list.push_front(ChatSession::placeholder("a"));
        let ids: Vec<_> = list.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_replace_from_server_keeps_unknown_active() {
        let mut list = SessionList::default();
        list.push_front(ChatSession::placeholder("local"));
        list.record("local", "draft question", MessageKind::User, "");

        let summaries: Vec<SessionSummary> = serde_json::from_value(serde_json::json!([
            {"sessionId": "s1", "title": "Markets", "lastMessage": "Stocks rallied", "messageCount": 4},
            {"id": 7, "messageCount": 0}
        ]))
        .unwrap();
        list.replace_from_server(&summaries, "local");

        let ids: Vec<_> = list.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["local", "s1", "7"]);
        assert_eq!(list.get("local").unwrap().title, "draft question");
        assert_eq!(list.get("7").unwrap().title, PLACEHOLDER_TITLE);

        list.replace_from_server(&summaries, "s1");
        assert_eq!(list.len(), 2);
    }
}
