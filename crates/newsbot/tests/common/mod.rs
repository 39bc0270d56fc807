//! Test utilities: in-memory transport, scripted REST API, local HTTP server.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use newsbot::api::{NewsApi, RequestError, RequestResult};
use newsbot::config::ChatConfig;
use newsbot::socket::{EventBus, EventName, Handler, ListenerId, Transport};
use newsbot::ChatController;
use newsbot_protocol::ClientCommand;
use newsbot_protocol::rest::{
    CreateSessionResponse, HistoryResponse, SearchResponse, SessionListResponse,
};
use serde_json::{Value, json};

// ============================================================================
// Transport
// ============================================================================

/// Transport that never touches the network. Tests push server events with
/// [`FakeTransport::emit`] and inspect what the client sent.
#[derive(Default)]
pub struct FakeTransport {
    bus: EventBus,
    connected: AtomicBool,
    sent: Mutex<Vec<ClientCommand>>,
    dropped: Mutex<Vec<ClientCommand>>,
    connects: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn online() -> Arc<Self> {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn emit(&self, event: EventName, data: Value) {
        self.bus.emit(event, &data);
    }

    pub fn sent(&self) -> Vec<ClientCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent commands as `(event name, payload)` pairs.
    pub fn sent_events(&self) -> Vec<(&'static str, Value)> {
        self.sent()
            .iter()
            .map(|c| (c.event_name(), c.payload()))
            .collect()
    }

    pub fn dropped(&self) -> Vec<ClientCommand> {
        self.dropped.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn listener_count(&self, event: EventName) -> usize {
        self.bus.listener_count(event)
    }
}

impl Transport for FakeTransport {
    fn connect(&self, url: &str) {
        self.connects.lock().unwrap().push(url.to_string());
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.bus.clear();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn on(&self, event: EventName, handler: Handler) -> ListenerId {
        self.bus.on(event, handler)
    }

    fn off(&self, event: EventName, id: ListenerId) -> bool {
        self.bus.off(event, id)
    }

    fn send_command(&self, command: ClientCommand) {
        if self.is_connected() {
            self.sent.lock().unwrap().push(command);
        } else {
            self.dropped.lock().unwrap().push(command);
        }
    }
}

// ============================================================================
// REST API
// ============================================================================

pub fn unavailable(path: &str) -> RequestError {
    RequestError::Status {
        status: 503,
        url: format!("http://backend.test/api/v1{path}"),
    }
}

pub fn not_found(path: &str) -> RequestError {
    RequestError::Status {
        status: 404,
        url: format!("http://backend.test/api/v1{path}"),
    }
}

/// Scripted REST API. Unscripted calls fail with 503, except history and
/// session listing which default to empty results.
#[derive(Default)]
pub struct FakeApi {
    pub search: Mutex<Option<RequestResult<SearchResponse>>>,
    /// Per-call search latency, consumed front to back.
    pub search_delays: Mutex<VecDeque<Duration>>,
    pub created: Mutex<Option<RequestResult<CreateSessionResponse>>>,
    pub listed: Mutex<Option<RequestResult<SessionListResponse>>>,
    pub cleared: Mutex<Option<RequestResult<Value>>>,
    pub deleted: Mutex<Option<RequestResult<Value>>>,
    pub backed_up: Mutex<Option<RequestResult<Value>>>,
    /// History per session id, optionally delayed.
    pub histories: Mutex<HashMap<String, (Duration, RequestResult<HistoryResponse>)>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_search(&self, result: RequestResult<SearchResponse>) {
        *self.search.lock().unwrap() = Some(result);
    }

    pub fn delay_searches(&self, delays: &[Duration]) {
        self.search_delays.lock().unwrap().extend(delays.iter().copied());
    }

    pub fn script_create(&self, result: RequestResult<CreateSessionResponse>) {
        *self.created.lock().unwrap() = Some(result);
    }

    pub fn script_list(&self, result: RequestResult<SessionListResponse>) {
        *self.listed.lock().unwrap() = Some(result);
    }

    pub fn script_clear(&self, result: RequestResult<Value>) {
        *self.cleared.lock().unwrap() = Some(result);
    }

    pub fn script_delete(&self, result: RequestResult<Value>) {
        *self.deleted.lock().unwrap() = Some(result);
    }

    pub fn script_backup(&self, result: RequestResult<Value>) {
        *self.backed_up.lock().unwrap() = Some(result);
    }

    pub fn script_history(
        &self,
        session_id: &str,
        delay: Duration,
        result: RequestResult<HistoryResponse>,
    ) {
        self.histories
            .lock()
            .unwrap()
            .insert(session_id.to_string(), (delay, result));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn scripted<T: Clone>(slot: &Mutex<Option<RequestResult<T>>>, path: &str) -> RequestResult<T> {
    slot.lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| Err(unavailable(path)))
}

#[async_trait]
impl NewsApi for FakeApi {
    async fn search_news(
        &self,
        query: &str,
        generate_answer: bool,
    ) -> RequestResult<SearchResponse> {
        self.record(format!("search {query} {generate_answer}"));
        let delay = self.search_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted(&self.search, "/news/search")
    }

    async fn list_sessions(&self, limit: u32, offset: u32) -> RequestResult<SessionListResponse> {
        self.record(format!("list {limit} {offset}"));
        self.listed
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(SessionListResponse::default()))
    }

    async fn create_session(&self) -> RequestResult<CreateSessionResponse> {
        self.record("create".to_string());
        scripted(&self.created, "/chat/sessions")
    }

    async fn get_chat_history(
        &self,
        session_id: &str,
        limit: u32,
    ) -> RequestResult<HistoryResponse> {
        self.record(format!("history {session_id} {limit}"));
        let scripted = self.histories.lock().unwrap().get(session_id).cloned();
        match scripted {
            Some((delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => Ok(HistoryResponse::default()),
        }
    }

    async fn clear_session_cache(&self, session_id: &str) -> RequestResult<Value> {
        self.record(format!("clear {session_id}"));
        scripted(&self.cleared, "/cache")
    }

    async fn delete_session(&self, session_id: &str) -> RequestResult<Value> {
        self.record(format!("delete {session_id}"));
        scripted(&self.deleted, "/chat/sessions/x")
    }

    async fn backup_session(&self, session_id: &str) -> RequestResult<Value> {
        self.record(format!("backup {session_id}"));
        scripted(&self.backed_up, "/backup")
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn controller(transport: &Arc<FakeTransport>, api: &Arc<FakeApi>) -> ChatController {
    ChatController::new(transport.clone(), api.clone(), ChatConfig::default())
}

/// A `new_message` payload.
pub fn message_event(
    id: &str,
    session_id: &str,
    kind: &str,
    content: &str,
    timestamp: &str,
) -> Value {
    json!({
        "id": id,
        "type": kind,
        "sender": kind,
        "content": content,
        "timestamp": timestamp,
        "sessionId": session_id,
    })
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}
