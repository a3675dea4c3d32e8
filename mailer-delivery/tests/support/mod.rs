//! Shared doubles for the pipeline tests.
#![allow(dead_code)] // Not every helper is used by every test binary

pub mod relay;

use std::{sync::Arc, time::Duration};

use mailer_delivery::{Dispatcher, MessagePoller, PollerSettings, RetryPolicy, TemplateStore};
use tempfile::TempDir;

pub use relay::RecordingRelay;

/// The welcome request: valid, with an implicit `extra` param and a locale.
pub const WELCOME: &[u8] =
    br#"{"template":"welcome","to":"a@x.com","from":"b@x.com","Locale":"en","extra":"v1"}"#;

/// A template directory holding only `welcome.text.template`.
pub fn welcome_templates() -> TempDir {
    let dir = tempfile::tempdir().expect("create template directory");
    std::fs::write(
        dir.path().join("welcome.text.template"),
        "Welcome! Your code is {{ extra }}.",
    )
    .expect("write template");
    dir
}

pub fn dispatcher(templates: &TempDir, relay: Arc<RecordingRelay>) -> Arc<Dispatcher> {
    Arc::new(
        Dispatcher::new(TemplateStore::new(templates.path()), relay)
            .with_default_subject("User Activation"),
    )
}

/// Settings with millisecond pauses so loops run quickly on the real clock.
pub fn settings(max_messages: usize, max_errors: u32) -> PollerSettings {
    PollerSettings {
        queue: "inbox".to_string(),
        max_messages,
        interval: Duration::from_millis(10),
        read_errors: RetryPolicy::new(max_errors),
        drain_timeout: Duration::from_secs(5),
    }
}

pub fn poller(dispatcher: Arc<Dispatcher>, max_messages: usize, max_errors: u32) -> MessagePoller {
    MessagePoller::new(settings(max_messages, max_errors), dispatcher)
}
