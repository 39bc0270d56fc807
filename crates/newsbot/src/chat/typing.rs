//! Typing indicator debounce.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::socket::Transport;

/// One stop-typing timer per controller.
///
/// Each keystroke announces `typing{true}` and re-arms the timer; when the
/// timer fires, `typing{false}` is sent for the session it was armed for.
#[derive(Debug)]
pub struct TypingDebounce {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl TypingDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Announce typing and (re)start the stop timer.
    pub fn keystroke(&mut self, transport: &Arc<dyn Transport>, session_id: &str) {
        transport.set_typing(session_id, true);
        self.cancel();

        let transport = Arc::clone(transport);
        let session_id = session_id.to_string();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            transport.set_typing(&session_id, false);
        }));
    }

    /// Drop the pending timer. Returns true if one was still armed, in which
    /// case the caller owes the server a `typing{false}`.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }
}

impl Drop for TypingDebounce {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
