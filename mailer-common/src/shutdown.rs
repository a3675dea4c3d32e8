//! Process-wide cooperative shutdown.
//!
//! A [`Shutdown`] is a write-once flag shared by every loop in the daemon.
//! It is set either by the OS signal listener or by the connection
//! supervisor once it has exhausted its retry ceiling, and is observed at
//! the top of the supervisor and poller loops. Nothing is interrupted
//! mid-flight: requesting shutdown only stops new cycles from starting.
//!
//! Sleeps between cycles go through [`Shutdown::sleep`], which returns early
//! once shutdown is requested so the next checkpoint is reached promptly.

use std::{fmt, sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::internal;

/// Why shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An interrupt, quit or terminate signal was received.
    Signal(&'static str),
    /// The connection supervisor exceeded its retry ceiling.
    RetriesExhausted,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "received {name}"),
            Self::RetriesExhausted => f.write_str("connection retries exhausted"),
        }
    }
}

/// Shared, cloneable handle to the shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    state: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (state, _receiver) = watch::channel(None);
        Self {
            state: Arc::new(state),
        }
    }

    /// Request shutdown.
    ///
    /// Only the first request is recorded; later requests leave the original
    /// reason in place. Returns `true` if this call set the flag.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        let first = self.state.send_if_modified(|current| {
            if current.is_some() {
                false
            } else {
                *current = Some(reason);
                true
            }
        });

        if first {
            internal!(level = INFO, "Shutdown requested: {reason}");
        }

        first
    }

    /// Checkpoint read: has shutdown been requested?
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// The reason recorded by the first request, if any.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.state.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = receiver.wait_for(Option::is_some).await;
    }

    /// Sleep for `duration`, waking early if shutdown is requested.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.requested() => false,
        }
    }
}
