mod amqp;
mod memory;
mod scripted;

pub use amqp::AmqpBroker;
pub use memory::MemoryBroker;
pub use scripted::{ScriptedBroker, SessionScript, Step};
