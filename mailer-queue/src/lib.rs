//! Broker collaborators for the mailer daemon.
//!
//! The daemon only needs four operations from a message broker: connect,
//! retrieve one delivery, acknowledge a delivery, and close. [`Broker`] and
//! [`Session`] capture those; the backends provide an AMQP implementation
//! plus in-memory and scripted ones for tests.

pub mod backends;
mod broker;
mod error;

pub use backends::{AmqpBroker, MemoryBroker, ScriptedBroker, SessionScript, Step};
pub use broker::{Acknowledge, Broker, Delivery, DeliveryHandle, Session};
pub use error::{BrokerError, Result};
