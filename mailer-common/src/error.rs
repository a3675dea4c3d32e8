//! Error types for the mailer-common crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while loading or validating the daemon configuration.
///
/// All of these are fatal: the daemon does not start without a valid
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid JSON, or has the wrong shape.
    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    /// No broker server addresses were configured.
    #[error("No queue server connection information")]
    NoQueueServers,

    /// The relay block, or its server, is missing.
    #[error("No SMTP relay connection information")]
    NoRelayServer,

    /// `paths.templates` was given as an empty string.
    #[error("No template directory specified")]
    NoTemplateDirectory,

    /// `paths.templates` does not exist or is not a directory.
    #[error("Template directory {0} does not exist or is not a directory")]
    TemplateDirectoryInvalid(PathBuf),

    /// The options block is missing entirely.
    #[error("No options block set in configuration file")]
    NoOptions,

    /// `options.poll-queue` is missing or empty.
    #[error("No message queue name set in configuration file")]
    NoPollQueue,
}
