use std::sync::Arc;

use mailer_common::incoming;
use mailer_queue::Delivery;

use crate::{
    DispatchError, QueueEnvelope,
    relay::{OutgoingMessage, Relay},
    template::TemplateStore,
};

/// Processes one delivery: decode, render, relay, acknowledge.
///
/// The delivery is acknowledged only once the relay has accepted the
/// message. Any earlier failure drops the handle unacknowledged and the
/// broker decides when to redeliver; nothing is retried here.
pub struct Dispatcher {
    templates: TemplateStore,
    relay: Arc<dyn Relay>,
    default_subject: String,
}

impl Dispatcher {
    pub fn new(templates: TemplateStore, relay: Arc<dyn Relay>) -> Self {
        Self {
            templates,
            relay,
            default_subject: String::new(),
        }
    }

    /// Subject used when a request supplies none.
    #[must_use]
    pub fn with_default_subject(mut self, subject: impl Into<String>) -> Self {
        self.default_subject = subject.into();
        self
    }

    /// Process `delivery`, logging the outcome.
    ///
    /// This is the fire-and-forget entry point run once per delivery.
    pub async fn process(&self, delivery: Delivery) {
        let id = delivery.id.clone();

        match self.dispatch(delivery).await {
            Ok(()) => {
                incoming!(level = INFO, message_id = %id, "Delivered and acknowledged");
            }
            Err(error) if error.is_permanent() => {
                incoming!(
                    level = ERROR,
                    message_id = %id,
                    kind = error.kind(),
                    error = %error,
                    "Rejected delivery; it will fail the same way on every redelivery"
                );
            }
            Err(error) => {
                incoming!(
                    level = WARN,
                    message_id = %id,
                    kind = error.kind(),
                    error = %error,
                    "Failed to process delivery, leaving it unacknowledged for redelivery"
                );
            }
        }
    }

    /// Process `delivery`, returning why it was left unacknowledged.
    ///
    /// # Errors
    /// Any decode, template, relay or acknowledgement failure
    pub async fn dispatch(&self, delivery: Delivery) -> Result<(), DispatchError> {
        let Delivery { id, body, handle } = delivery;

        let command = QueueEnvelope::parse(id.as_str(), &body)?.into_command()?;
        incoming!(
            level = DEBUG,
            message_id = %id,
            template = command.template(),
            "Decoded request for {}",
            command.to()
        );

        let template = self.templates.resolve(command.template()).await?;
        let bodies = template.render(command.params()).await?;
        let message = OutgoingMessage::new(&command, bodies, &self.default_subject);

        self.relay.send(&message).await?;
        handle.acknowledge().await?;

        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("templates", &self.templates)
            .field("default_subject", &self.default_subject)
            .finish_non_exhaustive()
    }
}
