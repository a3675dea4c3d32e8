//! Error types for the mailer-queue crate.

use thiserror::Error;

/// Convenience alias for broker results.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors raised by broker collaborators.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No server addresses were supplied to connect to.
    #[error("No broker servers configured")]
    NoServers,

    /// Every configured server refused the connection.
    #[error("Failed to connect to {server}: {reason}")]
    Connect { server: String, reason: String },

    /// Reading from a queue failed.
    #[error("Failed to retrieve from queue {queue}: {reason}")]
    Retrieve { queue: String, reason: String },

    /// Acknowledging a delivery failed.
    #[error("Failed to acknowledge delivery {id}: {reason}")]
    Acknowledge { id: String, reason: String },

    /// Closing the session failed.
    #[error("Failed to close session: {0}")]
    Close(String),

    /// The session was already closed.
    #[error("Session is closed")]
    Closed,
}
