//! Conversation message types.
//!
//! Messages are what the backend stores per session and what the client
//! renders. Content may carry markup; it is passed through untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique within a session. Older backends send numeric ids.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Who produced the message.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Display name of the sender.
    #[serde(default)]
    pub sender: String,

    /// Message body. May contain markup; never escaped by the client.
    #[serde(default)]
    pub content: String,

    /// ISO-8601 timestamp. Empty when the server omitted it.
    #[serde(default)]
    pub timestamp: String,

    /// Articles the answer was drawn from, in ranking order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,

    /// Retrieval details for assistant answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SearchMetadata>,
}

impl Message {
    /// Build a message with no sources or metadata. The sender mirrors the kind.
    pub fn new(
        id: impl Into<String>,
        kind: MessageKind,
        content: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            sender: kind.to_string(),
            content: content.into(),
            timestamp: timestamp.into(),
            sources: None,
            metadata: None,
        }
    }
}

/// Message author kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    System,
    Bot,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
            Self::Bot => write!(f, "bot"),
        }
    }
}

/// A cited article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ============================================================================
// Retrieval metadata
// ============================================================================

/// How an assistant answer was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    /// Retrieval backend that answered (e.g. vector store, cache).
    #[serde(default)]
    pub source: String,

    /// Pipeline step that produced the answer.
    #[serde(default)]
    pub search_step: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_found: Option<u64>,

    /// Primary article backing the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_details: Option<ArticleDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_considered: Option<u64>,
}

/// Article record as returned by the search pipeline.
///
/// Field casing follows the backend verbatim, which mixes snake and camel case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleDetails {
    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,

    #[serde(
        default,
        rename = "urlToImage",
        skip_serializing_if = "Option::is_none"
    )]
    pub url_to_image: Option<String>,

    /// Relevance score in `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Similarity as reported by the backend (string or number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<Value>,
}

impl From<&ArticleDetails> for Source {
    fn from(details: &ArticleDetails) -> Self {
        Self {
            title: details.title.clone(),
            url: details.url.clone(),
        }
    }
}

/// Accept either a JSON string or a JSON number and store it as a string.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
