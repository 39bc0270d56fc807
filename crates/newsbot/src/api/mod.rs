//! REST fallback client.
//!
//! Used for session CRUD and for answering questions while the realtime
//! channel is down.

mod client;
mod error;

use async_trait::async_trait;
use serde_json::Value;

use newsbot_protocol::rest::{
    CreateSessionResponse, HistoryResponse, SearchResponse, SessionListResponse,
};

pub use client::ApiClient;
pub use error::{RequestError, RequestResult};

/// News backend REST surface, abstracted so the controller can run against
/// a fake in tests.
#[async_trait]
pub trait NewsApi: Send + Sync {
    async fn search_news(&self, query: &str, generate_answer: bool)
    -> RequestResult<SearchResponse>;
    async fn list_sessions(&self, limit: u32, offset: u32) -> RequestResult<SessionListResponse>;
    async fn create_session(&self) -> RequestResult<CreateSessionResponse>;
    async fn get_chat_history(&self, session_id: &str, limit: u32)
    -> RequestResult<HistoryResponse>;
    async fn clear_session_cache(&self, session_id: &str) -> RequestResult<Value>;
    async fn delete_session(&self, session_id: &str) -> RequestResult<Value>;
    async fn backup_session(&self, session_id: &str) -> RequestResult<Value>;
}

#[async_trait]
impl NewsApi for ApiClient {
    async fn search_news(
        &self,
        query: &str,
        generate_answer: bool,
    ) -> RequestResult<SearchResponse> {
        self.search_news(query, generate_answer).await
    }

    async fn list_sessions(&self, limit: u32, offset: u32) -> RequestResult<SessionListResponse> {
        self.list_sessions(limit, offset).await
    }

    async fn create_session(&self) -> RequestResult<CreateSessionResponse> {
        self.create_session().await
    }

    async fn get_chat_history(
        &self,
        session_id: &str,
        limit: u32,
    ) -> RequestResult<HistoryResponse> {
        self.get_chat_history(session_id, limit).await
    }

    async fn clear_session_cache(&self, session_id: &str) -> RequestResult<Value> {
        self.clear_session_cache(session_id).await
    }

    async fn delete_session(&self, session_id: &str) -> RequestResult<Value> {
        self.delete_session(session_id).await
    }

    async fn backup_session(&self, session_id: &str) -> RequestResult<Value> {
        self.backup_session(session_id).await
    }
}
