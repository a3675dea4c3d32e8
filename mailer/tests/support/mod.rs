//! Shared fixtures for the daemon tests.
#![allow(dead_code)] // Not every helper is used by every test binary

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use mailer::Mailer;
use mailer_common::DaemonConfig;
use mailer_delivery::{OutgoingMessage, Relay, RelayError};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Relay that records every message it accepts.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl RecordingRelay {
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), RelayError> {
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// A daemon with its own template directory.
pub struct Harness {
    pub templates: TempDir,
    pub mailer: Mailer,
    pub relay: Arc<RecordingRelay>,
}

/// Build a daemon whose template directory holds `templates`, with `options`
/// spliced into the configuration's options block.
pub fn harness(templates: &[(&str, &str)], options: &str) -> Harness {
    let dir = tempfile::tempdir().expect("create template directory");
    for (name, content) in templates {
        std::fs::write(dir.path().join(name), content).expect("write template");
    }

    let config = DaemonConfig::from_json(&config_json(dir.path(), options)).expect("valid config");

    Harness {
        templates: dir,
        mailer: Mailer::new(config),
        relay: Arc::new(RecordingRelay::default()),
    }
}

pub fn config_json(templates: &Path, options: &str) -> String {
    let options = if options.is_empty() {
        String::new()
    } else {
        format!(", {options}")
    };

    format!(
        r#"{{
            "queue": {{ "servers": ["amqp://localhost:5672/%2f"] }},
            "relay": {{ "server": {{ "host": "localhost" }} }},
            "paths": {{ "templates": {:?} }},
            "options": {{ "poll-queue": "inbox", "default-subject": "User Activation"{options} }}
        }}"#,
        templates.display().to_string()
    )
}
