//! Plain counters protected by the scheduler's single mutex. No atomics
//! needed — every mutation happens while the lock is already held for
//! intake or tick.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_messages: u64,
    pub total_success: u64,
    pub total_failed: u64,
    pub in_progress: u64,
    /// Number of Persistence Port calls that returned an error. A persistence
    /// failure never blocks forward progress, so this is the only way to
    /// notice that writes are silently being lost.
    pub persistence_errors: u64,
}
