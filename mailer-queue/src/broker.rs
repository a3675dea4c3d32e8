use std::fmt;

use async_trait::async_trait;

use crate::Result;

/// A message broker the daemon can open sessions against.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a new session.
    ///
    /// # Errors
    /// If no session could be established
    async fn connect(&self) -> Result<Box<dyn Session>>;
}

/// A live connection to a broker.
///
/// A session is owned by exactly one poller at a time; it is never shared.
#[async_trait]
pub trait Session: Send {
    /// Pull at most one delivery from `queue`.
    ///
    /// `Ok(None)` means the queue is currently empty.
    ///
    /// # Errors
    /// If the broker could not be read
    async fn retrieve(&mut self, queue: &str) -> Result<Option<Delivery>>;

    /// Close the session. Deliveries that were never acknowledged are
    /// returned to the broker for redelivery.
    ///
    /// # Errors
    /// If the broker reported a failure while closing
    async fn close(&mut self) -> Result<()>;
}

/// Backend half of a [`DeliveryHandle`].
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Confirm the delivery has been processed.
    ///
    /// # Errors
    /// If the broker rejected the acknowledgement
    async fn acknowledge(&self) -> Result<()>;
}

/// Broker-opaque reference to a single delivery.
///
/// Acknowledging consumes the handle, so a delivery is acknowledged at most
/// once. Dropping it without acknowledging leaves the delivery pending, and
/// the broker redelivers it according to its own policy.
pub struct DeliveryHandle {
    acker: Box<dyn Acknowledge>,
}

impl DeliveryHandle {
    pub fn new(acker: impl Acknowledge + 'static) -> Self {
        Self {
            acker: Box::new(acker),
        }
    }

    /// Acknowledge the delivery.
    ///
    /// # Errors
    /// If the broker rejected the acknowledgement
    pub async fn acknowledge(self) -> Result<()> {
        self.acker.acknowledge().await
    }
}

impl fmt::Debug for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryHandle").finish_non_exhaustive()
    }
}

/// One unit of work pulled from the broker.
#[derive(Debug)]
pub struct Delivery {
    /// Broker-assigned message identifier.
    pub id: String,
    /// Raw wire body.
    pub body: Vec<u8>,
    pub handle: DeliveryHandle,
}

impl Delivery {
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>, handle: DeliveryHandle) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            handle,
        }
    }
}
