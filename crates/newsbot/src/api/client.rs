//! News backend HTTP client.

use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

use newsbot_protocol::rest::{
    CreateSessionResponse, HistoryResponse, SearchResponse, SessionListResponse,
};

use super::error::{RequestError, RequestResult};

/// Client for the news backend REST API.
///
/// Stateless apart from the connection pool. No call is retried here.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP client.
    client: Client,
    /// Base URL including the API prefix (e.g. "http://localhost:5000/api/v1").
    base_url: String,
}

impl ApiClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RequestResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::Transport {
                url: base_url.clone(),
                message: format!("building HTTP client: {e}"),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search the news corpus, optionally generating an answer.
    #[instrument(skip(self), level = "debug")]
    pub async fn search_news(
        &self,
        query: &str,
        generate_answer: bool,
    ) -> RequestResult<SearchResponse> {
        let generate = generate_answer.to_string();
        let request = self
            .builder(Method::GET, "/news/search")
            .query(&[("q", query), ("generateAnswer", generate.as_str())]);
        self.execute(request, "/news/search").await
    }

    /// List sessions, newest first, one page at a time.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_sessions(&self, limit: u32, offset: u32) -> RequestResult<SessionListResponse> {
        let request = self
            .builder(Method::GET, "/chat/sessions")
            .query(&[("limit", limit), ("offset", offset)]);
        self.execute(request, "/chat/sessions").await
    }

    /// Ask the backend to allocate a new session.
    #[instrument(skip(self), level = "debug")]
    pub async fn create_session(&self) -> RequestResult<CreateSessionResponse> {
        let request = self.builder(Method::POST, "/chat/sessions");
        self.execute(request, "/chat/sessions").await
    }

    /// Fetch up to `limit` messages of a session's history.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_chat_history(
        &self,
        session_id: &str,
        limit: u32,
    ) -> RequestResult<HistoryResponse> {
        let path = session_path(session_id, "/history");
        let request = self
            .builder(Method::GET, &path)
            .query(&[("limit", limit)]);
        self.execute(request, &path).await
    }

    /// Drop the backend's cached conversation for a session.
    #[instrument(skip(self), level = "debug")]
    pub async fn clear_session_cache(&self, session_id: &str) -> RequestResult<Value> {
        let path = session_path(session_id, "/cache");
        let request = self.builder(Method::DELETE, &path);
        self.execute(request, &path).await
    }

    /// Delete a session and its history.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete_session(&self, session_id: &str) -> RequestResult<Value> {
        let path = session_path(session_id, "");
        let request = self.builder(Method::DELETE, &path);
        self.execute(request, &path).await
    }

    /// Ask the backend to snapshot a session to durable storage.
    #[instrument(skip(self), level = "debug")]
    pub async fn backup_session(&self, session_id: &str) -> RequestResult<Value> {
        let path = session_path(session_id, "/backup");
        let request = self.builder(Method::POST, &path);
        self.execute(request, &path).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("Content-Type", "application/json")
    }

    /// Send a request and decode the JSON body, mapping every failure to
    /// a [`RequestError`].
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> RequestResult<T> {
        let url = self.url(path);
        let result = self.execute_inner(request, &url).await;
        if let Err(ref e) = result {
            warn!("API request failed: {}", e);
        }
        result
    }

    async fn execute_inner<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
    ) -> RequestResult<T> {
        let response = request.send().await.map_err(|e| RequestError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| RequestError::Transport {
            url: url.to_string(),
            message: format!("reading body: {e}"),
        })?;
        debug!("{} -> {} ({} bytes)", url, status, body.len());

        if body.iter().all(u8::is_ascii_whitespace) {
            // 204 and friends: only `Value`/`Option` targets accept this.
            return serde_json::from_value(Value::Null)
                .map_err(|e| RequestError::Decode(format!("empty body: {e}")));
        }

        serde_json::from_slice(&body).map_err(|e| RequestError::Decode(e.to_string()))
    }
}

/// `/chat/sessions/{id}{suffix}` with the id percent-encoded.
fn session_path(session_id: &str, suffix: &str) -> String {
    format!(
        "/chat/sessions/{}{}",
        urlencoding::encode(session_id),
        suffix
    )
}
