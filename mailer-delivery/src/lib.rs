//! The resilience and dispatch pipeline of the mailer daemon.
//!
//! - [`ConnectionSupervisor`] owns the broker connection lifecycle and its
//!   retry ceiling
//! - [`MessagePoller`] drains a connected session in bounded batches
//! - [`Dispatcher`] decodes, renders, relays and acknowledges one delivery
//! - [`decode`] turns a raw body into a validated [`EmailCommand`]

mod command;
mod decode;
mod envelope;
mod error;
pub mod policy;
mod processor;
mod relay;
mod template;

pub use command::EmailCommand;
pub use decode::{Field, decode};
pub use envelope::QueueEnvelope;
pub use error::{DecodeError, DispatchError, RelayError, ValidationError, ValidationErrors};
pub use policy::{RetryCounter, RetryPolicy};
pub use processor::{
    ConnectionState, ConnectionSupervisor, Dispatcher, MessagePoller, PollerExit, PollerSettings,
    PollerStats, SupervisorExit,
};
pub use relay::{OutgoingMessage, Relay, SmtpRelay, TlsMode};
pub use template::{RenderedBodies, ResolvedTemplate, TemplateStore, TemplateVariant};
