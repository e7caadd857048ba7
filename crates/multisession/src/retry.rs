//! Per-session reconnect accounting.

use std::collections::HashMap;

use parking_lot::Mutex;

use multisession_core::{DisconnectReason, SessionId};

/// Consecutive retryable disconnects tolerated before a session is abandoned.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Why a session was terminated instead of reconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The account logged this device out
    LoggedOut,
    /// The retry budget ran out
    RetriesExhausted,
}

/// Outcome of a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect; `attempt` is the new consecutive attempt count
    Retry {
        /// Attempt number, starting at 1
        attempt: u32,
    },
    /// Tear the session down
    Terminate(TerminationReason),
}

/// Decide what to do with a close carrying `code` after `attempt` prior retries.
///
/// A close without a code is retryable.
pub fn decide(attempt: u32, code: Option<u16>) -> RetryDecision {
    if code == Some(DisconnectReason::LOGGED_OUT_CODE) {
        RetryDecision::Terminate(TerminationReason::LoggedOut)
    } else if attempt >= MAX_RETRY_ATTEMPTS {
        RetryDecision::Terminate(TerminationReason::RetriesExhausted)
    } else {
        RetryDecision::Retry {
            attempt: attempt + 1,
        }
    }
}

/// Consecutive reconnect attempts per session.
///
/// An entry exists only while a session is between a retryable close and the
/// next successful open.
#[derive(Debug, Default)]
pub struct RetryCounter {
    counts: Mutex<HashMap<SessionId, u32>>,
}

impl RetryCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current attempt count, `None` if the session has no failure on record.
    pub fn get(&self, id: &SessionId) -> Option<u32> {
        self.counts.lock().get(id).copied()
    }

    /// Apply the retry policy to a close event and record the result.
    ///
    /// Reading the current count, deciding, and storing the outcome happen
    /// under one lock.
    pub fn record_close(&self, id: &SessionId, code: Option<u16>) -> RetryDecision {
        let mut counts = self.counts.lock();
        let attempt = counts.get(id).copied().unwrap_or(0);
        let decision = decide(attempt, code);

        match decision {
            RetryDecision::Retry { attempt } => {
                counts.insert(id.clone(), attempt);
            }
            RetryDecision::Terminate(_) => {
                counts.remove(id);
            }
        }

        decision
    }

    /// Forget the session's failures. Returns the count that was cleared.
    pub fn reset(&self, id: &SessionId) -> Option<u32> {
        self.counts.lock().remove(id)
    }

    /// All recorded counts, sorted by session id.
    pub fn snapshot(&self) -> Vec<(SessionId, u32)> {
        let mut entries: Vec<_> = self
            .counts
            .lock()
            .iter()
            .map(|(id, count)| (id.clone(), *count))
            .collect();
        entries.sort();
        entries
    }
}
