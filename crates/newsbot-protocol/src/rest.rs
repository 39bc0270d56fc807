//! REST request/response bodies under `/api/v1`.

use serde::{Deserialize, Serialize};

use crate::messages::{ArticleDetails, Message, SearchMetadata, string_or_number};

/// `GET /news/search` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Generated answer, when `generateAnswer=true` and generation succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_answer: Option<String>,

    /// Fallback text when no answer was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_step: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_found: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_details: Option<ArticleDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_considered: Option<u64>,
}

impl SearchResponse {
    /// Answer text: the generated answer, else the plain message.
    pub fn answer_text(&self) -> Option<&str> {
        self.ai_answer
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.message.as_deref().filter(|s| !s.is_empty()))
    }

    /// Metadata block attached to the synthesized assistant message.
    pub fn metadata(&self) -> SearchMetadata {
        SearchMetadata {
            source: self.source.clone().unwrap_or_default(),
            search_step: self.search_step.clone().unwrap_or_default(),
            total_found: self.total_found,
            source_details: self.source_details.clone(),
            sources_considered: self.sources_considered,
        }
    }
}

/// One row of `GET /chat/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,

    #[serde(default)]
    pub message_count: u64,

    /// ISO-8601 time of the last activity (or creation).
    #[serde(
        default,
        alias = "createdAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_activity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionListResponse {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// `POST /chat/sessions` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub session_id: String,
}

/// `GET /chat/sessions/{id}/history` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<Message>,
}
