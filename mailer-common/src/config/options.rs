//! Loop tuning options.
//!
//! The `options` block of the configuration file is deserialised leniently
//! (signed integers, everything optional) and then normalised into
//! [`Options`], replacing absent or out-of-range values with defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::ConfigError;

/// The `options` block as it appears on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct RawOptions {
    #[serde(default)]
    conn_max_retries: i64,
    #[serde(default)]
    conn_retry_interval: i64,
    #[serde(default)]
    poll_max_messages: i64,
    #[serde(default)]
    poll_interval: i64,
    #[serde(default)]
    poll_queue: Option<String>,
    #[serde(default)]
    poll_max_errors: i64,
    #[serde(default = "defaults::shutdown_timeout_secs")]
    shutdown_timeout: i64,
    #[serde(default)]
    default_subject: String,
}

/// Validated loop options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Connection retry ceiling; 0 means retry forever.
    pub conn_max_retries: u32,

    /// Pause between connection attempts.
    ///
    /// Default: 60 seconds
    pub conn_retry_interval: Duration,

    /// Upper bound on deliveries pulled per poll cycle.
    ///
    /// Default: 10
    pub poll_max_messages: usize,

    /// Pause between poll cycles.
    ///
    /// Default: 10 seconds
    pub poll_interval: Duration,

    /// Name of the queue to drain, before the server prefix is applied.
    pub poll_queue: String,

    /// Consecutive retrieval failures tolerated before the session is
    /// considered degraded. Values below 1 fall back to the default.
    ///
    /// Default: 10
    pub poll_max_errors: u32,

    /// How long in-flight dispatches are waited on when a session ends.
    ///
    /// Default: 30 seconds
    pub shutdown_timeout: Duration,

    /// Subject used when a request supplies none.
    ///
    /// Default: "User Activation"
    pub default_subject: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            conn_max_retries: 0,
            conn_retry_interval: Duration::from_secs(defaults::conn_retry_interval_secs()),
            poll_max_messages: defaults::poll_max_messages(),
            poll_interval: Duration::from_secs(defaults::poll_interval_secs()),
            poll_queue: "inbox".to_string(),
            poll_max_errors: defaults::POLL_MAX_ERRORS,
            shutdown_timeout: Duration::from_secs(30),
            default_subject: defaults::DEFAULT_SUBJECT.to_string(),
        }
    }
}

fn positive_secs(value: i64, default: u64) -> Duration {
    Duration::from_secs(u64::try_from(value).ok().filter(|v| *v > 0).unwrap_or(default))
}

impl TryFrom<RawOptions> for Options {
    type Error = ConfigError;

    fn try_from(raw: RawOptions) -> Result<Self, Self::Error> {
        let poll_queue = raw
            .poll_queue
            .map(|queue| queue.trim().to_string())
            .filter(|queue| !queue.is_empty())
            .ok_or(ConfigError::NoPollQueue)?;

        Ok(Self {
            conn_max_retries: u32::try_from(raw.conn_max_retries.max(0)).unwrap_or(u32::MAX),
            conn_retry_interval: positive_secs(
                raw.conn_retry_interval,
                defaults::conn_retry_interval_secs(),
            ),
            poll_max_messages: usize::try_from(raw.poll_max_messages)
                .ok()
                .filter(|max| *max > 0)
                .unwrap_or_else(defaults::poll_max_messages),
            poll_interval: positive_secs(raw.poll_interval, defaults::poll_interval_secs()),
            poll_queue,
            poll_max_errors: u32::try_from(raw.poll_max_errors)
                .ok()
                .filter(|max| *max > 0)
                .unwrap_or(defaults::POLL_MAX_ERRORS),
            shutdown_timeout: Duration::from_secs(u64::try_from(raw.shutdown_timeout).unwrap_or(0)),
            default_subject: Some(raw.default_subject.trim())
                .filter(|subject| !subject.is_empty())
                .unwrap_or(defaults::DEFAULT_SUBJECT)
                .to_string(),
        })
    }
}

mod defaults {
    pub const fn conn_retry_interval_secs() -> u64 {
        60
    }

    pub const fn poll_max_messages() -> usize {
        10
    }

    pub const fn poll_interval_secs() -> u64 {
        10
    }

    pub const POLL_MAX_ERRORS: u32 = 10;

    pub const DEFAULT_SUBJECT: &str = "User Activation";

    pub const fn shutdown_timeout_secs() -> i64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn raw(json: &str) -> RawOptions {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_applied_when_absent() {
        let options = Options::try_from(raw(r#"{ "poll-queue": "inbox" }"#)).unwrap();

        assert_eq!(options, Options::default());
        assert_eq!(options.poll_max_errors, 10);
        assert_eq!(options.default_subject, "User Activation");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let options = Options::try_from(raw(
            r#"{
                "poll-queue": "outbound",
                "conn-max-retries": -4,
                "conn-retry-interval": 0,
                "poll-max-messages": -1,
                "poll-interval": -10,
                "poll-max-errors": 0,
                "default-subject": "   "
            }"#,
        ))
        .unwrap();

        assert_eq!(options.conn_max_retries, 0);
        assert_eq!(options.conn_retry_interval, Duration::from_secs(60));
        assert_eq!(options.poll_max_messages, 10);
        assert_eq!(options.poll_interval, Duration::from_secs(10));
        assert_eq!(options.poll_max_errors, 10);
        assert_eq!(options.default_subject, "User Activation");
        assert_eq!(options.poll_queue, "outbound");
    }

    #[test]
    fn test_explicit_values_kept() {
        let options = Options::try_from(raw(
            r#"{
                "poll-queue": "inbox",
                "conn-max-retries": 3,
                "conn-retry-interval": 5,
                "poll-max-messages": 1,
                "poll-interval": 2,
                "poll-max-errors": 4,
                "shutdown-timeout": 0,
                "default-subject": "Hello"
            }"#,
        ))
        .unwrap();

        assert_eq!(options.conn_max_retries, 3);
        assert_eq!(options.conn_retry_interval, Duration::from_secs(5));
        assert_eq!(options.poll_max_messages, 1);
        assert_eq!(options.poll_interval, Duration::from_secs(2));
        assert_eq!(options.poll_max_errors, 4);
        assert_eq!(options.shutdown_timeout, Duration::ZERO);
        assert_eq!(options.default_subject, "Hello");
    }

    #[test]
    fn test_poll_queue_required() {
        assert!(matches!(
            Options::try_from(raw("{}")),
            Err(ConfigError::NoPollQueue)
        ));
        assert!(matches!(
            Options::try_from(raw(r#"{ "poll-queue": "  " }"#)),
            Err(ConfigError::NoPollQueue)
        ));
    }
}
