//! End-to-end tests for the mailer daemon
//!
//! These run the full supervisor, poller and dispatcher stack against
//! in-process brokers and a recording relay.
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::{sync::Arc, time::Duration};

use mailer::Mailer;
use mailer_common::{Shutdown, ShutdownReason};
use mailer_delivery::SupervisorExit;
use mailer_queue::{MemoryBroker, ScriptedBroker, SessionScript};
use pretty_assertions::assert_eq;

const WELCOME: &str =
    r#"{"template":"welcome","to":"a@x.com","from":"b@x.com","Locale":"en","extra":"v1"}"#;

/// Request shutdown once `broker` has acknowledged `count` messages.
fn stop_after_acks(broker: MemoryBroker, count: usize, shutdown: Shutdown) {
    tokio::spawn(async move {
        while broker.acknowledged().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.request(ShutdownReason::Signal("SIGTERM"));
    });
}

#[tokio::test]
async fn test_welcome_request_delivered_and_acknowledged() {
    let harness = support::harness(
        &[("welcome.text.template", "Hi {{ extra }} ({{ missing }})")],
        "",
    );
    let broker = MemoryBroker::new();
    let id = broker.publish("inbox", WELCOME);
    let shutdown = Shutdown::new();
    stop_after_acks(broker.clone(), 1, shutdown.clone());

    let exit = tokio::time::timeout(
        Duration::from_secs(10),
        harness
            .mailer
            .serve(Arc::new(broker.clone()), harness.relay.clone(), &shutdown),
    )
    .await
    .expect("mailer should stop once the message is acknowledged");

    assert_eq!(exit, SupervisorExit::ShutdownRequested);
    assert_eq!(broker.acknowledged(), vec![id]);
    assert_eq!(broker.ready("inbox"), 0);

    let sent = harness.relay.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@x.com");
    assert_eq!(sent[0].from, "b@x.com");
    assert_eq!(sent[0].subject, "User Activation");
    assert_eq!(sent[0].text.as_deref(), Some("Hi v1 ()"));
    assert_eq!(sent[0].html, None);
}

#[tokio::test]
async fn test_invalid_requests_stay_queued() {
    let harness = support::harness(&[("welcome.text.template", "Hi")], "");
    let broker = MemoryBroker::new();
    broker.publish("inbox", r#"{"template":"welcome","from":"b@x.com"}"#);
    broker.publish("inbox", r#"{"template":"unknown","to":"a@x.com","from":"b@x.com"}"#);
    broker.publish("inbox", "not json");
    let good = broker.publish("inbox", WELCOME);
    let shutdown = Shutdown::new();
    stop_after_acks(broker.clone(), 1, shutdown.clone());

    let exit = tokio::time::timeout(
        Duration::from_secs(10),
        harness
            .mailer
            .serve(Arc::new(broker.clone()), harness.relay.clone(), &shutdown),
    )
    .await
    .unwrap();

    assert_eq!(exit, SupervisorExit::ShutdownRequested);
    assert_eq!(broker.acknowledged(), vec![good]);
    assert_eq!(harness.relay.sent().len(), 1);
    // Closing the session hands the three rejected requests back to the queue.
    assert_eq!(broker.ready("inbox"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_stops_daemon() {
    let harness = support::harness(
        &[("welcome.text.template", "Hi")],
        r#""conn-max-retries": 2, "conn-retry-interval": 30"#,
    );
    let shutdown = Shutdown::new();
    let broker = ScriptedBroker::new(vec![SessionScript::Refuse; 5], shutdown.clone());

    let exit = harness
        .mailer
        .serve(Arc::new(broker.clone()), harness.relay.clone(), &shutdown)
        .await;

    assert_eq!(exit, SupervisorExit::RetriesExhausted);
    assert_eq!(broker.connect_attempts(), 3);
    assert_eq!(shutdown.reason(), Some(ShutdownReason::RetriesExhausted));
}

#[test]
fn test_load_reports_missing_configuration() {
    let err = Mailer::load("/definitely/not/here/mailer.json").unwrap_err();

    assert!(
        err.to_string().contains("/definitely/not/here/mailer.json"),
        "{err:#}"
    );
}

#[test]
fn test_load_reads_configuration_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mailer.json");
    std::fs::write(&path, support::config_json(dir.path(), r#""poll-max-messages": 5"#)).unwrap();

    let mailer = Mailer::load(&path).unwrap();

    assert_eq!(mailer.config().options.poll_max_messages, 5);
    assert_eq!(mailer.config().options.default_subject, "User Activation");
    assert_eq!(mailer.config().relay.server.port_or_default(), 25);
}
