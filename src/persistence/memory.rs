//! In-process Persistence Port used by tests, examples, and `--dry-run`.

use super::PersistencePort;
use crate::error::Result;
use crate::models::{MessageState, MessageStatus};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    pending: BTreeMap<String, MessageState>,
    success: Vec<(String, MessageState)>,
    failed: Vec<(String, MessageState)>,
}

/// A `HashMap`-backed Persistence Port. Never fails; useful as the
/// `--dry-run` backend and in unit tests that want to exercise the
/// scheduler's state machine without a real object store.
#[derive(Default)]
pub struct MemoryPersistence {
    inner: Mutex<Inner>,
    seq: Mutex<u64>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonically increasing sequence number, used in place of a wall
    /// clock timestamp so in-memory "recency" ordering is deterministic in
    /// tests even when two writes land in the same microsecond.
    fn next_seq(&self) -> u64 {
        let mut seq = self.seq.lock().unwrap();
        *seq += 1;
        *seq
    }
}

impl PersistencePort for MemoryPersistence {
    fn save_pending(&self, state: &MessageState) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .pending
            .insert(state.message_id.clone(), state.clone());
        Ok(())
    }

    fn load_pending(&self, message_id: &str) -> Result<Option<MessageState>> {
        Ok(self.inner.lock().unwrap().pending.get(message_id).cloned())
    }

    fn load_all_pending(&self) -> Result<Vec<MessageState>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .pending
            .values()
            .filter(|s| s.status == MessageStatus::Pending)
            .cloned()
            .collect())
    }

    fn delete_pending(&self, message_id: &str) -> Result<()> {
        self.inner.lock().unwrap().pending.remove(message_id);
        Ok(())
    }

    fn write_success(&self, state: &MessageState) -> Result<()> {
        let seq = self.next_seq();
        let mut inner = self.inner.lock().unwrap();
        inner
            .success
            .push((format!("{seq:020}_{}", state.message_id), state.clone()));
        Ok(())
    }

    fn write_failed(&self, state: &MessageState) -> Result<()> {
        let seq = self.next_seq();
        let mut inner = self.inner.lock().unwrap();
        inner
            .failed
            .push((format!("{seq:020}_{}", state.message_id), state.clone()));
        Ok(())
    }

    fn recent_success(&self, limit: usize) -> Result<Vec<MessageState>> {
        let inner = self.inner.lock().unwrap();
        let mut entries = inner.success.clone();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().take(limit).map(|(_, s)| s).collect())
    }

    fn recent_failed(&self, limit: usize) -> Result<Vec<MessageState>> {
        let inner = self.inner.lock().unwrap();
        let mut entries = inner.failed.clone();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().take(limit).map(|(_, s)| s).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn save_then_load_round_trips() {
        let store = MemoryPersistence::new();
        let state = MessageState::new_pending(Message::new("m1", "hi"), 1.0);
        store.save_pending(&state).unwrap();
        assert_eq!(store.load_pending("m1").unwrap(), Some(state));
        assert_eq!(store.load_pending("missing").unwrap(), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryPersistence::new();
        store.delete_pending("nope").unwrap();
        store.delete_pending("nope").unwrap();
    }

    #[test]
    fn recent_success_is_newest_first() {
        let store = MemoryPersistence::new();
        for id in ["a", "b", "c"] {
            let state = MessageState::new_pending(Message::new(id, "hi"), 1.0);
            store.write_success(&state).unwrap();
        }
        let recent = store.recent_success(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message_id, "c");
        assert_eq!(recent[1].message_id, "b");
    }

    #[test]
    fn load_all_pending_filters_by_status() {
        let store = MemoryPersistence::new();
        let mut pending = MessageState::new_pending(Message::new("p1", "hi"), 1.0);
        store.save_pending(&pending).unwrap();
        pending.message_id = "p2".into();
        pending.message.message_id = "p2".into();
        pending.status = MessageStatus::Success;
        store.save_pending(&pending).unwrap();

        let all = store.load_all_pending().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message_id, "p1");
    }
}
