//! The Persistence Port: abstract storage with CRUD over three namespaces —
//! pending state, success log, failure log.

mod memory;
mod s3;

pub use memory::MemoryPersistence;
pub use s3::{S3Config, S3Persistence};

use crate::error::{Result, SchedulerError};
use crate::models::MessageState;
use chrono::Utc;

/// Default key prefixes for the three namespaces.
pub const DEFAULT_STATE_PREFIX: &str = "state";
pub const DEFAULT_SUCCESS_PREFIX: &str = "success";
pub const DEFAULT_FAILED_PREFIX: &str = "failed";

/// Abstract object storage for message state. Keys are opaque strings;
/// implementations are free to choose how they map onto an underlying
/// store as long as the pending/success/failure namespace conventions below hold.
///
/// Implementations must be safe to call concurrently — the scheduler core
/// assumes the storage client backing this port handles its own
/// concurrency.
pub trait PersistencePort: Send + Sync {
    /// Write (or overwrite) the pending record for `state.message_id`.
    fn save_pending(&self, state: &MessageState) -> Result<()>;

    /// Load the pending record for `message_id`, or `None` if absent.
    fn load_pending(&self, message_id: &str) -> Result<Option<MessageState>>;

    /// Enumerate every record under the pending namespace whose status is
    /// still `PENDING`. Individual unreadable records are skipped, not
    /// fatal; a total enumeration failure returns an empty set (treated as
    /// an empty recovery set).
    fn load_all_pending(&self) -> Result<Vec<MessageState>>;

    /// Idempotent delete of the pending record for `message_id`.
    fn delete_pending(&self, message_id: &str) -> Result<()>;

    /// Append a success-log record with a lexicographically time-sortable
    /// key.
    fn write_success(&self, state: &MessageState) -> Result<()>;

    /// Append a failure-log record with a lexicographically time-sortable
    /// key.
    fn write_failed(&self, state: &MessageState) -> Result<()>;

    /// Up to `limit` most-recently-modified success records, newest first.
    fn recent_success(&self, limit: usize) -> Result<Vec<MessageState>>;

    /// Up to `limit` most-recently-modified failure records, newest first.
    fn recent_failed(&self, limit: usize) -> Result<Vec<MessageState>>;
}

/// Build the pending-record key for a message id under `prefix`.
pub(crate) fn pending_key(prefix: &str, message_id: &str) -> String {
    format!("{prefix}/{message_id}.json")
}

/// Build a time-sortable log key: `<prefix>/<iso8601-utc-micros>_<message_id>.json`.
/// ISO-8601 UTC with microsecond precision and colons sorts lexicographically
/// in chronological order.
pub(crate) fn log_key(prefix: &str, message_id: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    format!("{prefix}/{timestamp}_{message_id}.json")
}

pub(crate) fn serialize(state: &MessageState) -> Result<String> {
    serde_json::to_string(state)
        .map_err(|e| SchedulerError::Persistence(format!("failed to serialize state: {e}")))
}

pub(crate) fn deserialize(raw: &str) -> Result<MessageState> {
    serde_json::from_str(raw)
        .map_err(|e| SchedulerError::Persistence(format!("failed to deserialize state: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_key_is_time_sortable_by_construction() {
        let k1 = log_key("success", "m1");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let k2 = log_key("success", "m1");
        assert!(k1 < k2);
    }

    #[test]
    fn pending_key_matches_layout() {
        assert_eq!(pending_key("state", "abc"), "state/abc.json");
    }
}
