use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use mailer_delivery::{OutgoingMessage, Relay, RelayError};
use parking_lot::Mutex;

/// Relay that records every message it accepts.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<OutgoingMessage>>,
    attempts: AtomicUsize,
    refuse: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A relay that rejects every message with a transport error.
    pub fn refusing() -> Self {
        let relay = Self::default();
        relay.refuse.store(true, Ordering::SeqCst);
        relay
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), RelayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.refuse.load(Ordering::SeqCst) {
            return Err(RelayError::Transport("421 service not available".to_string()));
        }

        self.sent.lock().push(message.clone());
        Ok(())
    }
}
