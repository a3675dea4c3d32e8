use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use ulid::Ulid;

use crate::{
    BrokerError, Result,
    broker::{Acknowledge, Broker, Delivery, DeliveryHandle, Session},
};

#[derive(Debug, Clone)]
struct StoredMessage {
    sequence: u64,
    id: String,
    body: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    acknowledged: Vec<String>,
    connections: usize,
    published: u64,
}

/// Deliveries handed out by one session and not yet acknowledged, keyed by id.
type Unacked = Arc<Mutex<HashMap<String, (String, StoredMessage)>>>;

/// In-memory broker.
///
/// Queues are plain FIFOs keyed by name. A retrieved message is held by the
/// session that retrieved it until it is acknowledged; closing the session
/// puts unacknowledged messages back at the front of their queue, matching
/// broker redelivery semantics.
///
/// Primarily intended for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `body` on `queue`, returning the assigned message id.
    pub fn publish(&self, queue: &str, body: impl Into<Vec<u8>>) -> String {
        let id = Ulid::new().to_string();
        let mut state = self.state.lock();
        state.published += 1;
        let sequence = state.published;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                sequence,
                id: id.clone(),
                body: body.into(),
            });
        id
    }

    /// Number of messages waiting on `queue`.
    #[must_use]
    pub fn ready(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Ids of every acknowledged message, in acknowledgement order.
    #[must_use]
    pub fn acknowledged(&self) -> Vec<String> {
        self.state.lock().acknowledged.clone()
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        self.state.lock().connections += 1;

        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            unacked: Unacked::default(),
            closed: false,
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
    unacked: Unacked,
    closed: bool,
}

#[async_trait]
impl Session for MemorySession {
    async fn retrieve(&mut self, queue: &str) -> Result<Option<Delivery>> {
        if self.closed {
            return Err(BrokerError::Closed);
        }

        let Some(message) = self
            .state
            .lock()
            .queues
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };

        self.unacked
            .lock()
            .insert(message.id.clone(), (queue.to_string(), message.clone()));

        Ok(Some(Delivery::new(
            message.id.clone(),
            message.body,
            DeliveryHandle::new(MemoryAcker {
                state: Arc::clone(&self.state),
                unacked: Arc::clone(&self.unacked),
                id: message.id,
            }),
        )))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut returned: Vec<_> = self.unacked.lock().drain().map(|(_, entry)| entry).collect();
        // Pushed to the front newest first, restoring publish order.
        returned.sort_by(|(_, a), (_, b)| b.sequence.cmp(&a.sequence));

        let mut state = self.state.lock();
        for (queue, message) in returned {
            state.queues.entry(queue).or_default().push_front(message);
        }

        Ok(())
    }
}

struct MemoryAcker {
    state: Arc<Mutex<State>>,
    unacked: Unacked,
    id: String,
}

#[async_trait]
impl Acknowledge for MemoryAcker {
    async fn acknowledge(&self) -> Result<()> {
        if self.unacked.lock().remove(&self.id).is_none() {
            return Err(BrokerError::Acknowledge {
                id: self.id.clone(),
                reason: "delivery no longer held by its session".to_string(),
            });
        }

        self.state.lock().acknowledged.push(self.id.clone());
        Ok(())
    }
}
