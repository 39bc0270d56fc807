//! Identifier and timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 9;

/// Locally generated session id: `session_<unix millis>_<9 base36 chars>`.
///
/// Used when the backend cannot allocate one, so the client stays usable
/// offline.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Id for a message synthesized on this side of the wire.
pub fn local_message_id() -> String {
    format!("local-{}", uuid::Uuid::new_v4())
}

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp. Returns `None` for empty or malformed input.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Short wall-clock label for sidebar entries (`HH:MM`, local time).
pub fn display_time(value: &str) -> Option<String> {
    parse_timestamp(value).map(|dt| {
        dt.with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string()
    })
}
