//! The Send Port: the injected primitive that actually delivers a message.
//!
//! The core neither knows nor cares what this does. A returned `Err` is
//! treated identically to a returned `Ok(false)` — both are failures that
//! consume an attempt.

use crate::models::Message;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Outcome of a single send attempt.
pub type SendOutcome = std::result::Result<bool, String>;

/// A function (or function-like object) that attempts to deliver a
/// `Message` and reports success/failure. Must not mutate the message.
/// May be called concurrently with itself; the reference core never does,
/// since it is strictly serial inside its lock, but the trait does not
/// assume that.
pub trait SendPort: Send + Sync {
    fn send(&self, message: &Message) -> SendOutcome;
}

impl<F> SendPort for F
where
    F: Fn(&Message) -> SendOutcome + Send + Sync,
{
    fn send(&self, message: &Message) -> SendOutcome {
        self(message)
    }
}

/// Mock sender for local testing and examples: succeeds with probability
/// `success_rate` (default 0.3, chosen so six tries amplify the chance of
/// total failure to roughly 11% — useful for exercising the retry path).
pub struct MockSendPort {
    success_rate: f64,
    attempts: AtomicU64,
}

impl MockSendPort {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Default for MockSendPort {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl SendPort for MockSendPort {
    fn send(&self, message: &Message) -> SendOutcome {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let success = rand::thread_rng().gen::<f64>() < self.success_rate;
        if success {
            info!(message_id = %message.message_id, "SMS sent successfully");
        } else {
            warn!(message_id = %message.message_id, "SMS send failed");
        }
        Ok(success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_implement_send_port() {
        let port: Box<dyn SendPort> = Box::new(|_: &Message| Ok(true));
        assert_eq!(port.send(&Message::new("m1", "hi")), Ok(true));
    }

    #[test]
    fn mock_send_port_counts_attempts() {
        let port = MockSendPort::new(1.0);
        let msg = Message::new("m1", "hi");
        for _ in 0..3 {
            assert_eq!(port.send(&msg), Ok(true));
        }
        assert_eq!(port.attempts(), 3);
    }
}
