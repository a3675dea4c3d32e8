use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use mailer_common::{Shutdown, ShutdownReason};
use parking_lot::Mutex;

use crate::{
    BrokerError, Result,
    broker::{Acknowledge, Broker, Delivery, DeliveryHandle, Session},
};

/// One scripted answer to a `retrieve` call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Hand out a delivery with this body.
    Deliver(Vec<u8>),
    /// Report the queue as empty.
    Empty,
    /// Fail the read.
    Fail,
}

/// One scripted answer to a `connect` call.
#[derive(Debug, Clone)]
pub enum SessionScript {
    /// Refuse the connection.
    Refuse,
    /// Open a session that plays out these steps.
    Accept(Vec<Step>),
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    retrievals: AtomicUsize,
    closes: AtomicUsize,
    delivered: AtomicUsize,
    acknowledged: Mutex<Vec<String>>,
}

/// Broker that replays a fixed script.
///
/// Every `connect` call consumes the next [`SessionScript`], and every
/// `retrieve` on an accepted session consumes the next [`Step`]. Once the
/// script has been played out the broker requests shutdown, as an operator
/// sending SIGTERM would, so loops under test wind down deterministically:
/// refusing the last scripted connection requests it, as does a `retrieve`
/// on a session with no steps left (which then reports an empty queue).
/// Acknowledging a delivery after its session has closed fails.
#[derive(Debug, Clone)]
pub struct ScriptedBroker {
    scripts: Arc<Mutex<VecDeque<SessionScript>>>,
    counters: Arc<Counters>,
    shutdown: Shutdown,
}

impl ScriptedBroker {
    pub fn new(scripts: impl IntoIterator<Item = SessionScript>, shutdown: Shutdown) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            counters: Arc::default(),
            shutdown,
        }
    }

    /// A broker whose first connection plays out `steps`.
    pub fn with_session(steps: Vec<Step>, shutdown: Shutdown) -> Self {
        Self::new([SessionScript::Accept(steps)], shutdown)
    }

    fn stop(&self) {
        self.shutdown.request(ShutdownReason::Signal("SIGTERM"));
    }

    /// Open a session directly, bypassing the connect script.
    pub fn session(&self, steps: Vec<Step>) -> Box<dyn Session> {
        Box::new(ScriptedSession {
            steps: steps.into(),
            broker: self.clone(),
            closed: Arc::default(),
        })
    }

    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn retrievals(&self) -> usize {
        self.counters.retrievals.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Number of deliveries handed out.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.counters.delivered.load(Ordering::SeqCst)
    }

    /// Ids of acknowledged deliveries, in acknowledgement order.
    #[must_use]
    pub fn acknowledged(&self) -> Vec<String> {
        self.counters.acknowledged.lock().clone()
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        let (script, exhausted) = {
            let mut scripts = self.scripts.lock();
            let script = scripts.pop_front();
            (script, scripts.is_empty())
        };

        match script {
            Some(SessionScript::Accept(steps)) => Ok(self.session(steps)),
            Some(SessionScript::Refuse) => {
                if exhausted {
                    self.stop();
                }
                Err(BrokerError::Connect {
                    server: "scripted".to_string(),
                    reason: "connection refused".to_string(),
                })
            }
            None => {
                self.stop();
                Err(BrokerError::NoServers)
            }
        }
    }
}

struct ScriptedSession {
    steps: VecDeque<Step>,
    broker: ScriptedBroker,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn retrieve(&mut self, queue: &str) -> Result<Option<Delivery>> {
        let counters = &self.broker.counters;
        counters.retrievals.fetch_add(1, Ordering::SeqCst);

        match self.steps.pop_front() {
            Some(Step::Deliver(body)) => {
                let sequence = counters.delivered.fetch_add(1, Ordering::SeqCst) + 1;
                let id = format!("scripted-{sequence}");
                Ok(Some(Delivery::new(
                    id.clone(),
                    body,
                    DeliveryHandle::new(ScriptedAcker {
                        counters: Arc::clone(counters),
                        closed: Arc::clone(&self.closed),
                        id,
                    }),
                )))
            }
            Some(Step::Empty) => Ok(None),
            Some(Step::Fail) => Err(BrokerError::Retrieve {
                queue: queue.to_string(),
                reason: "scripted failure".to_string(),
            }),
            None => {
                self.broker.stop();
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.broker.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedAcker {
    counters: Arc<Counters>,
    closed: Arc<AtomicBool>,
    id: String,
}

#[async_trait]
impl Acknowledge for ScriptedAcker {
    async fn acknowledge(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        self.counters.acknowledged.lock().push(self.id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_connect_follows_script() {
        let shutdown = Shutdown::new();
        let broker = ScriptedBroker::new(
            [SessionScript::Refuse, SessionScript::Accept(vec![])],
            shutdown.clone(),
        );

        assert!(broker.connect().await.is_err());
        assert!(!shutdown.is_requested());
        assert!(broker.connect().await.is_ok());
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_last_refusal_requests_shutdown() {
        let shutdown = Shutdown::new();
        let broker = ScriptedBroker::new([SessionScript::Refuse], shutdown.clone());

        assert!(broker.connect().await.is_err());
        assert!(shutdown.is_requested());
    }

    #[tokio::test]
    async fn test_session_plays_steps_then_stops() {
        let shutdown = Shutdown::new();
        let broker = ScriptedBroker::with_session(
            vec![Step::Deliver(b"{}".to_vec()), Step::Fail, Step::Empty],
            shutdown.clone(),
        );
        let mut session = broker.connect().await.unwrap();

        let delivery = session.retrieve("inbox").await.unwrap().unwrap();
        assert_eq!(delivery.id, "scripted-1");
        assert!(session.retrieve("inbox").await.is_err());
        assert!(session.retrieve("inbox").await.unwrap().is_none());
        assert!(!shutdown.is_requested());

        assert!(session.retrieve("inbox").await.unwrap().is_none());
        assert!(shutdown.is_requested());

        delivery.handle.acknowledge().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(broker.retrievals(), 4);
        assert_eq!(broker.delivered(), 1);
        assert_eq!(broker.acknowledged(), vec!["scripted-1".to_string()]);
        assert_eq!(broker.closes(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_after_close_fails() {
        let broker = ScriptedBroker::with_session(vec![], Shutdown::new());
        let mut session = broker.session(vec![Step::Deliver(b"{}".to_vec())]);

        let delivery = session.retrieve("inbox").await.unwrap().unwrap();
        session.close().await.unwrap();

        assert!(matches!(
            delivery.handle.acknowledge().await,
            Err(BrokerError::Closed)
        ));
        assert!(broker.acknowledged().is_empty());
    }
}
