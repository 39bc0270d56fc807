//! Line-oriented terminal front end: input parsing and incremental rendering.

use std::io::{self, Write};

use newsbot::ChatController;
use newsbot::connection::{ConnectionPhase, ConnectionState};
use newsbot::ids::display_time;
use newsbot_protocol::Message;

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(String),
    New,
    Switch(String),
    Delete(String),
    Clear,
    Sessions,
    Topics,
    /// Ask the canned query of a topic, 1-based.
    Topic(usize),
    Refresh,
    Backup,
    Reconnect,
    Status,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Send(line.trim_end_matches(['\r', '\n']).to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match (name, arg.is_empty()) {
            ("new", true) => Self::New,
            ("switch", false) => Self::Switch(arg.to_string()),
            ("delete", false) => Self::Delete(arg.to_string()),
            ("clear", true) => Self::Clear,
            ("sessions", true) => Self::Sessions,
            ("topics", true) => Self::Topics,
            ("topics", false) => match arg.parse::<usize>() {
                Ok(n) if (1..=TOPICS.len()).contains(&n) => Self::Topic(n),
                _ => Self::Invalid(trimmed.to_string()),
            },
            ("refresh", true) => Self::Refresh,
            ("backup", true) => Self::Backup,
            ("reconnect", true) => Self::Reconnect,
            ("status", true) => Self::Status,
            ("help", true) => Self::Help,
            ("quit" | "exit", true) => Self::Quit,
            _ => Self::Invalid(trimmed.to_string()),
        }
    }
}

/// Trending topics as (label, query).
pub const TOPICS: [(&str, &str); 6] = [
    (
        "AI & Tech",
        "Latest advancements and breakthroughs in artificial intelligence and technology?",
    ),
    (
        "Global Sports",
        "Top sports news, match results, and highlights from around the world?",
    ),
    (
        "Tesla",
        "All articles about Tesla from the last month, sorted by most recent first?",
    ),
    (
        "Economy & Markets",
        "Recent economic developments, market trends, and financial news?",
    ),
    (
        "Innovation Trends",
        "Emerging trends, innovations, and breakthrough ideas across industries?",
    ),
    (
        "Apple News",
        "Latest news, product updates, and innovations from Apple, sorted by recent first?",
    ),
];

/// Query for a 1-based topic number produced by [`Input::parse`].
pub fn topic_query(n: usize) -> Option<&'static str> {
    n.checked_sub(1)
        .and_then(|i| TOPICS.get(i))
        .map(|(_, query)| *query)
}

pub const HELP: &str = "\
Commands:
  <text>          ask about the news
  /new            start a new session
  /switch <id>    switch to another session
  /delete <id>    delete a session
  /clear          clear the current session
  /sessions       list sessions
  /topics         list trending topics
  /topics <n>     ask about trending topic n
  /refresh        reload the session list from the backend
  /backup         back up the current session
  /reconnect      reconnect the realtime channel
  /status         show connection and session status
  /quit           exit";

/// Remembers what has been printed so only changes are written.
#[derive(Debug, Default)]
pub struct View {
    session: String,
    printed: Vec<String>,
    status: Option<String>,
    typing: Vec<String>,
}

impl View {
    pub fn render(&mut self, controller: &ChatController) -> io::Result<()> {
        let mut out = io::stdout().lock();
        let messages = controller.messages();

        let continues = self.session == controller.active_session()
            && self.printed.len() <= messages.len()
            && self
                .printed
                .iter()
                .zip(messages)
                .all(|(id, m)| *id == m.id);

        if !continues {
            writeln!(out, "\n== session {} ==", controller.active_session())?;
            self.session = controller.active_session().to_string();
            self.printed.clear();
        }
        for message in &messages[self.printed.len()..] {
            write_message(&mut out, message)?;
            self.printed.push(message.id.clone());
        }

        let status = controller.status().map(|s| s.message.clone());
        if status != self.status {
            if let Some(ref text) = status {
                writeln!(out, "   ... {text}")?;
            }
            self.status = status;
        }

        if controller.typing_users() != self.typing.as_slice() {
            self.typing = controller.typing_users().to_vec();
            if !self.typing.is_empty() {
                writeln!(out, "   ({} typing)", self.typing.join(", "))?;
            }
        }
        out.flush()
    }
}

fn write_message(out: &mut impl Write, message: &Message) -> io::Result<()> {
    let time = display_time(&message.timestamp).unwrap_or_default();
    writeln!(out, "[{time}] {}: {}", message.sender, message.content)?;
    for source in message.sources.iter().flatten() {
        match source.url {
            Some(ref url) => writeln!(out, "    - {} <{url}>", source.title)?,
            None => writeln!(out, "    - {}", source.title)?,
        }
    }
    if let Some(ref meta) = message.metadata {
        if let Some(found) = meta.total_found {
            writeln!(out, "    ({} via {}, {} found)", meta.search_step, meta.source, found)?;
        }
    }
    Ok(())
}

pub fn print_sessions(controller: &ChatController) {
    for session in controller.sessions() {
        let marker = if session.id == controller.active_session() {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {}  [{} msgs, {}]  {}",
            session.id, session.title, session.message_count, session.timestamp, session.last_message
        );
    }
    if controller.is_sessions_loading() {
        println!("  (refreshing...)");
    }
}

pub fn print_topics() {
    for (i, (label, _)) in TOPICS.iter().enumerate() {
        println!("  {}. {label}", i + 1);
    }
}

pub fn describe_connection(state: &ConnectionState) -> String {
    let phase = match state.phase {
        ConnectionPhase::Idle => "idle",
        ConnectionPhase::Connecting => "connecting",
        ConnectionPhase::Connected => "connected",
        ConnectionPhase::Disconnected => "disconnected",
    };
    match state.error {
        Some(ref error) => format!("{phase} ({error})"),
        None => phase.to_string(),
    }
}
