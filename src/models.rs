//! The data model: `Message` (immutable caller payload) and `MessageState`
//! (mutable retry-tracking record), plus the fixed retry schedule.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied message payload. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    /// Construct a message with no metadata.
    pub fn new(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Lifecycle phase of a `MessageState`. Initial: `Pending`. Terminal:
/// `Success`, `FailedMaxRetries`. No other transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED_MAX_RETRIES")]
    FailedMaxRetries,
}

/// Maximum number of send attempts before a message is declared
/// permanently failed.
pub const MAX_ATTEMPTS: u32 = 6;

/// Delay (seconds, offset from `created_at`) before the attempt indexed by
/// `attempt_count`. `RETRY_SCHEDULE[0] == 0.0` is consumed by the
/// intake-time first attempt; after a failed attempt,
/// `RETRY_SCHEDULE[attempt_count]` (attempt_count already incremented)
/// yields the delay for the *next* attempt.
pub const RETRY_SCHEDULE: [f64; 6] = [0.0, 0.5, 2.0, 4.0, 8.0, 16.0];

/// Mutable tracking record for one in-flight (or terminal, in transit to a
/// log namespace) message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageState {
    pub message_id: String,
    pub message: Message,
    pub attempt_count: u32,
    pub next_retry_at: f64,
    pub status: MessageStatus,
    pub created_at: f64,
    pub updated_at: f64,
}

impl MessageState {
    /// Build the initial state for a freshly-intaken message: attempt
    /// count zero, immediately due, `PENDING`.
    pub fn new_pending(message: Message, now: f64) -> Self {
        Self {
            message_id: message.message_id.clone(),
            message,
            attempt_count: 0,
            next_retry_at: now,
            status: MessageStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this state is due for an attempt at `current_time`: its
    /// `next_retry_at` has passed and it is still `PENDING`.
    pub fn is_due(&self, current_time: f64) -> bool {
        self.status == MessageStatus::Pending && self.next_retry_at <= current_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_equality() {
        let msg = Message::new("m1", "hi");
        let state = MessageState::new_pending(msg, 100.0);
        let json = serde_json::to_string(&state).unwrap();
        let back: MessageState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn status_serializes_to_spec_labels() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&MessageStatus::FailedMaxRetries).unwrap(),
            "\"FAILED_MAX_RETRIES\""
        );
    }

    #[test]
    fn is_due_requires_pending_status() {
        let mut state = MessageState::new_pending(Message::new("m1", "hi"), 100.0);
        assert!(state.is_due(100.0));
        state.status = MessageStatus::Success;
        assert!(!state.is_due(100.0));
    }
}
