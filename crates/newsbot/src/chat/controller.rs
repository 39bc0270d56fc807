//! Session reconciliation controller.
//!
//! Owns the client's view of the active session: ordered message list,
//! sidebar, loading/status flags, typing users and the de-duplication
//! ledger. Every mutation happens through `&mut self`; network work runs on
//! spawned tasks whose results come back through the controller's inbox,
//! together with transport events, and are applied one at a time.

use std::future::Future;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use newsbot_protocol::events::{
    ConnectionStatus, NewMessage, ServerError, SessionCleared, SessionHistory, SessionJoined,
    StatusUpdate, UserTyping,
};
use newsbot_protocol::rest::{
    CreateSessionResponse, HistoryResponse, SearchResponse, SessionListResponse,
};
use newsbot_protocol::{Message, MessageKind, Source};

use super::ledger::{DedupLedger, DeliveryKey};
use super::sidebar::{ChatSession, SessionList};
use super::typing::TypingDebounce;
use crate::api::{NewsApi, RequestResult};
use crate::config::ChatConfig;
use crate::ids::{generate_session_id, local_message_id, now_timestamp, parse_timestamp};
use crate::socket::{EventName, ListenerId, Transport};

pub const GREETING: &str = "Hello! I'm your RAG-powered news chatbot. I can search through news articles and provide you with accurate, up-to-date information. Ask me about technology, sports, politics, economy, or any current events!";
pub const NEW_CHAT_GREETING: &str = "Hello! I'm your RAG-powered news chatbot. Ask me about any recent news, current events, or topics you're curious about!";
pub const SESSION_CLEARED: &str = "Session cleared! I'm ready for a fresh conversation. What would you like to know about current news?";
pub const SEARCH_FAILED: &str = "Sorry, I encountered an error while processing your request. Please check your connection and try again.";
const NO_RESPONSE: &str = "No response received";
const DEFAULT_SERVER_ERROR: &str = "Connection error occurred";

/// Transport events the controller reacts to.
const SUBSCRIBED: [EventName; 9] = [
    EventName::ConnectionStatus,
    EventName::SessionJoined,
    EventName::NewMessage,
    EventName::SessionHistory,
    EventName::SessionCleared,
    EventName::StatusUpdate,
    EventName::UserTyping,
    EventName::MessageError,
    EventName::SocketError,
];

/// Something for the controller to apply: a transport event or the result
/// of a request it started.
#[derive(Debug)]
pub struct Update(UpdateKind);

#[derive(Debug)]
enum UpdateKind {
    Event(EventName, Value),
    Done(Completion),
}

/// Result of a spawned request, tagged with the session it was issued for.
#[derive(Debug)]
enum Completion {
    Search {
        session_id: String,
        send: u64,
        result: RequestResult<SearchResponse>,
    },
    History {
        session_id: String,
        result: RequestResult<HistoryResponse>,
    },
    Created {
        result: RequestResult<CreateSessionResponse>,
    },
    Cleared {
        session_id: String,
        result: RequestResult<Value>,
    },
    Deleted {
        session_id: String,
        result: RequestResult<Value>,
    },
    Listed {
        result: RequestResult<SessionListResponse>,
    },
    BackedUp {
        session_id: String,
        result: RequestResult<Value>,
    },
}

/// Reconciliation controller. Must be driven from inside a Tokio runtime.
pub struct ChatController {
    transport: Arc<dyn Transport>,
    api: Arc<dyn NewsApi>,
    config: ChatConfig,

    active_session: String,
    messages: Vec<Message>,
    sessions: SessionList,
    input: String,
    loading: bool,
    /// Sequence number of the send that set `loading`, if any.
    pending_send: Option<u64>,
    sends: u64,
    sessions_loading: bool,
    status: Option<StatusUpdate>,
    typing_users: Vec<String>,
    ledger: DedupLedger,
    /// Deliveries already counted for sessions other than the active one.
    background: DedupLedger,
    typing: TypingDebounce,

    inbox_tx: mpsc::UnboundedSender<Update>,
    inbox_rx: mpsc::UnboundedReceiver<Update>,
    in_flight: usize,
    listeners: Vec<(EventName, ListenerId)>,
}

impl ChatController {
    /// Start with a fresh local session and subscribe to the transport.
    pub fn new(transport: Arc<dyn Transport>, api: Arc<dyn NewsApi>, config: ChatConfig) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let listeners = SUBSCRIBED
            .iter()
            .map(|&event| {
                let tx = inbox_tx.clone();
                let id = transport.on(
                    event,
                    Arc::new(move |data: &Value| {
                        let _ = tx.send(Update(UpdateKind::Event(event, data.clone())));
                    }),
                );
                (event, id)
            })
            .collect();

        let active_session = generate_session_id();
        let mut sessions = SessionList::default();
        sessions.push_front(ChatSession::placeholder(&active_session));

        let controller = Self {
            typing: TypingDebounce::new(config.typing_debounce()),
            transport,
            api,
            config,
            messages: vec![system_message(GREETING)],
            active_session,
            sessions,
            input: String::new(),
            loading: false,
            pending_send: None,
            sends: 0,
            sessions_loading: false,
            status: None,
            typing_users: Vec::new(),
            ledger: DedupLedger::default(),
            background: DedupLedger::default(),
            inbox_tx,
            inbox_rx,
            in_flight: 0,
            listeners,
        };

        if controller.transport.is_connected() {
            controller
                .transport
                .join_session(Some(&controller.active_session));
        }
        controller
    }

    // ========================================================================
    // State accessors
    // ========================================================================

    pub fn active_session(&self) -> &str {
        &self.active_session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn sessions(&self) -> &[ChatSession] {
        self.sessions.entries()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_sessions_loading(&self) -> bool {
        self.sessions_loading
    }

    /// Current progress note, if one is showing.
    pub fn status(&self) -> Option<&StatusUpdate> {
        self.status.as_ref()
    }

    pub fn typing_users(&self) -> &[String] {
        &self.typing_users
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    // ========================================================================
    // Event loop plumbing
    // ========================================================================

    /// Wait for the next event or request result.
    pub async fn next_update(&mut self) -> Option<Update> {
        self.inbox_rx.recv().await
    }

    pub fn apply(&mut self, update: Update) {
        match update.0 {
            UpdateKind::Event(event, data) => self.handle_event(event, data),
            UpdateKind::Done(completion) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.handle_completion(completion);
            }
        }
    }

    /// Apply queued updates until no request is outstanding.
    pub async fn settle(&mut self) {
        loop {
            while let Ok(update) = self.inbox_rx.try_recv() {
                self.apply(update);
            }
            if self.in_flight == 0 {
                return;
            }
            match self.inbox_rx.recv().await {
                Some(update) => self.apply(update),
                None => return,
            }
        }
    }

    fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Update(UpdateKind::Done(work.await)));
        });
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Update the input buffer and announce typing.
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        if self.transport.is_connected() {
            self.typing.keystroke(&self.transport, &self.active_session);
        }
    }

    /// Submit the current input buffer.
    pub fn submit(&mut self) -> bool {
        let text = std::mem::take(&mut self.input);
        let sent = self.send(&text);
        if !sent {
            self.input = text;
        }
        sent
    }

    /// Send a user message. Returns false if it was rejected (empty text or a
    /// send already in flight).
    pub fn send(&mut self, text: &str) -> bool {
        if text.trim().is_empty() || self.loading {
            debug!("send rejected (empty: {}, loading: {})", text.trim().is_empty(), self.loading);
            return false;
        }

        if self.typing.cancel() {
            self.transport.set_typing(&self.active_session, false);
        }
        self.input.clear();
        self.loading = true;
        self.sends += 1;
        self.pending_send = Some(self.sends);

        let now = now_timestamp();
        self.sessions
            .preview(&self.active_session, text, MessageKind::User, &now);

        if self.transport.is_connected() {
            // The server echoes the message back as `new_message`.
            self.transport.send_message(text, &self.active_session);
            return true;
        }

        debug!("transport down, answering through REST");
        self.append(Message::new(local_message_id(), MessageKind::User, text, now));

        let api = Arc::clone(&self.api);
        let query = text.to_string();
        let generate = self.config.generate_answer;
        let session_id = self.active_session.clone();
        let send = self.sends;
        self.spawn(async move {
            let result = api.search_news(&query, generate).await;
            Completion::Search {
                session_id,
                send,
                result,
            }
        });
        true
    }

    /// Switch to another session. Returns false if it is already active.
    pub fn select_chat(&mut self, session_id: &str) -> bool {
        if session_id == self.active_session {
            return false;
        }
        info!("switching to session {}", session_id);

        if self.typing.cancel() {
            self.transport.set_typing(&self.active_session, false);
        }
        self.active_session = session_id.to_string();
        self.sessions.ensure(session_id);
        self.ledger.clear();
        self.messages.clear();
        self.status = None;
        self.loading = false;
        self.pending_send = None;

        self.fetch_history();
        if self.transport.is_connected() {
            self.transport.join_session(Some(&self.active_session));
        }
        true
    }

    /// Delete a session on the backend, then drop it from the sidebar.
    pub fn delete_chat(&mut self, session_id: &str) {
        let api = Arc::clone(&self.api);
        let session_id = session_id.to_string();
        self.spawn(async move {
            let result = api.delete_session(&session_id).await;
            Completion::Deleted { session_id, result }
        });
    }

    /// Start a new session, allocated by the backend when possible.
    pub fn new_chat(&mut self) {
        let api = Arc::clone(&self.api);
        self.spawn(async move {
            let result = api.create_session().await;
            Completion::Created { result }
        });
    }

    /// Wipe the active session's conversation.
    pub fn clear_session(&mut self) {
        if self.transport.is_connected() {
            // Confirmed by a `session_cleared` event.
            self.transport.clear_session(&self.active_session);
            return;
        }

        let api = Arc::clone(&self.api);
        let session_id = self.active_session.clone();
        self.spawn(async move {
            let result = api.clear_session_cache(&session_id).await;
            Completion::Cleared { session_id, result }
        });
    }

    /// Reload the sidebar from the backend.
    pub fn refresh_sessions(&mut self) {
        self.sessions_loading = true;
        let api = Arc::clone(&self.api);
        let limit = self.config.session_page_size;
        self.spawn(async move {
            let result = api.list_sessions(limit, 0).await;
            Completion::Listed { result }
        });
    }

    /// Ask the backend to back up the active session.
    pub fn backup_session(&mut self) {
        let api = Arc::clone(&self.api);
        let session_id = self.active_session.clone();
        self.spawn(async move {
            let result = api.backup_session(&session_id).await;
            Completion::BackedUp { session_id, result }
        });
    }

    fn fetch_history(&mut self) {
        let api = Arc::clone(&self.api);
        let session_id = self.active_session.clone();
        let limit = self.config.history_limit;
        self.spawn(async move {
            let result = api.get_chat_history(&session_id, limit).await;
            Completion::History { session_id, result }
        });
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    fn handle_event(&mut self, event: EventName, data: Value) {
        match event {
            EventName::ConnectionStatus => {
                if let Some(status) = decode::<ConnectionStatus>(event, data) {
                    self.on_connection_status(status);
                }
            }
            EventName::NewMessage => {
                if let Some(message) = decode::<NewMessage>(event, data) {
                    self.on_new_message(message);
                }
            }
            EventName::SessionJoined => {
                if let Some(joined) = decode::<SessionJoined>(event, data) {
                    self.on_session_joined(joined);
                }
            }
            EventName::SessionHistory => {
                if let Some(history) = decode::<SessionHistory>(event, data) {
                    self.on_session_history(history);
                }
            }
            EventName::SessionCleared => {
                if let Some(cleared) = decode::<SessionCleared>(event, data) {
                    self.on_session_cleared(cleared);
                }
            }
            EventName::StatusUpdate => {
                if let Some(status) = decode::<StatusUpdate>(event, data) {
                    self.on_status_update(status);
                }
            }
            EventName::UserTyping => {
                if let Some(typing) = decode::<UserTyping>(event, data) {
                    self.on_user_typing(typing);
                }
            }
            EventName::MessageError | EventName::SocketError => {
                let error = decode::<ServerError>(event, data).unwrap_or_default();
                self.on_server_error(&error);
            }
            EventName::ConnectionError => {}
        }
    }

    fn on_connection_status(&mut self, status: ConnectionStatus) {
        if status.connected {
            debug!("connected, joining session {}", self.active_session);
            self.transport.join_session(Some(&self.active_session));
        } else if self.loading {
            // The echo of an in-flight send will never arrive.
            self.finish_loading();
        }
    }

    fn on_new_message(&mut self, event: NewMessage) {
        let mut message = event.message;
        if message.timestamp.is_empty() {
            message.timestamp = now_timestamp();
        }
        let session_id = event
            .session_id
            .unwrap_or_else(|| self.active_session.clone());

        let key = DeliveryKey::new(&message.id, &session_id, &message.timestamp);

        if session_id != self.active_session {
            if self.background.contains(&key) {
                debug!("dropping replayed message {} for {}", message.id, session_id);
                return;
            }
            debug!("message for inactive session {}", session_id);
            self.background.insert(key);
            self.sessions
                .record(&session_id, &message.content, message.kind, &message.timestamp);
            return;
        }

        if self.ledger.contains(&key) {
            debug!("dropping replayed message {}", message.id);
            self.finish_loading();
            return;
        }
        if self.is_duplicate(&message) {
            self.finish_loading();
            return;
        }

        self.ledger.insert(key);
        self.finish_loading();
        self.append(message);
    }

    /// Exact id match, or same content and sender within the configured
    /// window (the server may re-deliver with a regenerated id).
    fn is_duplicate(&self, incoming: &Message) -> bool {
        let incoming_at = parse_timestamp(&incoming.timestamp);
        for existing in &self.messages {
            if existing.id == incoming.id {
                debug!("dropping message with known id {}", incoming.id);
                return true;
            }
            if existing.content != incoming.content || existing.sender != incoming.sender {
                continue;
            }
            let (Some(a), Some(b)) = (parse_timestamp(&existing.timestamp), incoming_at) else {
                continue;
            };
            if (a - b).num_milliseconds().abs() <= self.config.duplicate_window_ms {
                info!(
                    "treating message {} as a re-delivery of {} (same content within {}ms)",
                    incoming.id, existing.id, self.config.duplicate_window_ms
                );
                return true;
            }
        }
        false
    }

    fn on_session_joined(&mut self, joined: SessionJoined) {
        if joined.session_id != self.active_session {
            debug!("ignoring join confirmation for {}", joined.session_id);
            return;
        }
        self.ledger.clear();
        if !joined.history.is_empty() {
            self.messages = joined.history;
        }
    }

    fn on_session_history(&mut self, history: SessionHistory) {
        let Some(history) = history.history else {
            return;
        };
        self.ledger.clear();
        self.messages = history;
    }

    fn on_session_cleared(&mut self, cleared: SessionCleared) {
        if cleared.session_id != self.active_session {
            debug!("ignoring clear of inactive session {}", cleared.session_id);
            return;
        }
        self.reset_to(SESSION_CLEARED);
        self.finish_loading();
    }

    fn on_status_update(&mut self, status: StatusUpdate) {
        if status.visible {
            self.loading = true;
            self.status = Some(status);
        } else {
            self.status = None;
        }
    }

    fn on_user_typing(&mut self, typing: UserTyping) {
        if typing.is_typing {
            if !self.typing_users.contains(&typing.user_id) {
                self.typing_users.push(typing.user_id);
            }
        } else {
            self.typing_users.retain(|u| *u != typing.user_id);
        }
    }

    fn on_server_error(&mut self, error: &ServerError) {
        let text = error.text().unwrap_or(DEFAULT_SERVER_ERROR);
        warn!("server reported error: {}", text);
        self.finish_loading();
        self.note(format!("Error: {text}"));
    }

    // ========================================================================
    // Request results
    // ========================================================================

    fn is_stale(&self, session_id: &str, what: &str) -> bool {
        if session_id != self.active_session {
            debug!(
                "discarding {} result for {} (active session is now {})",
                what, session_id, self.active_session
            );
            return true;
        }
        false
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Search {
                session_id,
                send,
                result,
            } => {
                if !self.is_stale(&session_id, "search") {
                    match result {
                        Ok(response) => self.append(assistant_message(&response)),
                        Err(_) => self.note(SEARCH_FAILED),
                    }
                }
                // Only the send that set the flag may clear it.
                if self.pending_send == Some(send) {
                    self.finish_loading();
                }
            }

            Completion::History { session_id, result } => {
                if self.is_stale(&session_id, "history") {
                    return;
                }
                match result {
                    Ok(response) => {
                        self.ledger.clear();
                        self.messages = response.history;
                    }
                    // Sessions created offline are unknown to the backend.
                    Err(e) if e.is_not_found() => self.ledger.clear(),
                    Err(_) => self.note("Could not load the history of this session."),
                }
            }

            Completion::Created { result } => {
                let session_id = match result {
                    Ok(response) => response.session_id,
                    Err(_) => {
                        let local = generate_session_id();
                        info!("backend did not allocate a session, using local id {}", local);
                        local
                    }
                };
                self.start_session(session_id);
            }

            Completion::Cleared { session_id, result } => {
                if self.is_stale(&session_id, "clear") {
                    return;
                }
                match result {
                    Ok(_) => self.reset_to(SESSION_CLEARED),
                    Err(_) => self.note("Could not clear the session. Please try again."),
                }
                self.finish_loading();
            }

            Completion::Deleted { session_id, result } => match result {
                Ok(_) => self.forget_session(&session_id),
                Err(e) if e.is_not_found() => self.forget_session(&session_id),
                Err(_) => self.note("Could not delete the session."),
            },

            Completion::Listed { result } => {
                self.sessions_loading = false;
                if let Ok(response) = result {
                    // Server counts supersede what was tallied locally.
                    self.background.clear();
                    self.sessions
                        .replace_from_server(&response.sessions, &self.active_session);
                }
            }

            Completion::BackedUp { session_id, result } => {
                if self.is_stale(&session_id, "backup") {
                    return;
                }
                let note = match result {
                    Ok(_) => "Session backed up.",
                    Err(_) => "Could not back up the session.",
                };
                self.note(note);
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn append(&mut self, message: Message) {
        self.sessions.record(
            &self.active_session,
            &message.content,
            message.kind,
            &message.timestamp,
        );
        self.messages.push(message);
    }

    /// Local status text. Shown in the conversation but kept out of the
    /// sidebar, which tracks what was actually said.
    fn note(&mut self, text: impl Into<String>) {
        self.messages.push(system_message(text));
    }

    /// Replace the conversation with a single system note.
    fn reset_to(&mut self, text: &str) {
        self.ledger.clear();
        self.messages = vec![system_message(text)];
    }

    fn finish_loading(&mut self) {
        self.loading = false;
        self.pending_send = None;
        self.status = None;
    }

    fn start_session(&mut self, session_id: String) {
        info!("starting session {}", session_id);
        if self.typing.cancel() {
            self.transport.set_typing(&self.active_session, false);
        }
        self.sessions.push_front(ChatSession::placeholder(&session_id));
        self.active_session = session_id;
        self.reset_to(NEW_CHAT_GREETING);
        self.finish_loading();
        if self.transport.is_connected() {
            self.transport.join_session(Some(&self.active_session));
        }
    }

    fn forget_session(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
        if session_id != self.active_session {
            return;
        }
        match self.sessions.first_id().map(str::to_string) {
            Some(next) => {
                self.select_chat(&next);
            }
            None => self.new_chat(),
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        for (event, id) in self.listeners.drain(..) {
            self.transport.off(event, id);
        }
    }
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("active_session", &self.active_session)
            .field("messages", &self.messages.len())
            .field("sessions", &self.sessions.len())
            .field("loading", &self.loading)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(event: EventName, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("ignoring malformed {} payload: {}", event, e);
            None
        }
    }
}

fn system_message(text: impl Into<String>) -> Message {
    Message::new(local_message_id(), MessageKind::System, text, now_timestamp())
}

fn assistant_message(response: &SearchResponse) -> Message {
    let mut message = Message::new(
        local_message_id(),
        MessageKind::Assistant,
        response.answer_text().unwrap_or(NO_RESPONSE),
        now_timestamp(),
    );
    message.sources = response
        .source_details
        .as_ref()
        .map(|details| vec![Source::from(details)]);
    message.metadata = Some(response.metadata());
    message
}
