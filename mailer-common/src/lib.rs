//! Shared building blocks for the mailer daemon: configuration, logging and
//! the process-wide shutdown coordinator.

pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use config::DaemonConfig;
pub use error::ConfigError;
pub use shutdown::{Shutdown, ShutdownReason};
pub use tracing;
