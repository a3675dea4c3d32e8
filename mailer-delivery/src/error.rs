//! Typed error handling for the dispatch pipeline.
//!
//! Every error here is message-scoped: it is logged against the delivery
//! that raised it and the delivery is left unacknowledged, so redelivery is
//! up to the broker. Nothing in this module is fatal to the daemon.

use std::{fmt, io};

use mailer_queue::BrokerError;
use thiserror::Error;

use crate::template::TemplateVariant;

/// A single schema violation found while decoding a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A field carried a value of the wrong type.
    #[error("Field '{field}' must be {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },

    /// A required field was absent or empty.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

impl ValidationError {
    /// Name of the offending field.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::InvalidType { field, .. } | Self::MissingField(field) => field,
        }
    }
}

/// Every schema violation in a request, in a stable order.
///
/// Type errors come first, in key order, followed by missing required fields
/// in the order `template`, `to`, `from`. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub(crate) const fn new(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ValidationError] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Errors turning a raw delivery body into an [`EmailCommand`](crate::EmailCommand).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not well-formed JSON.
    #[error("Malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The body parsed, but its top level is not an object.
    #[error("Message payload is {0}, expected an object")]
    NotAMapping(&'static str),

    /// The payload failed schema validation.
    #[error("Invalid email request: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Errors raised by the mail relay collaborator.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A sender or recipient address could not be parsed.
    #[error("Invalid {field} address '{address}': {reason}")]
    InvalidAddress {
        field: &'static str,
        address: String,
        reason: String,
    },

    /// The outgoing message could not be assembled.
    #[error("Failed to build message: {0}")]
    Build(String),

    /// The relay's TLS parameters could not be built.
    #[error("Failed to configure relay TLS: {0}")]
    Tls(String),

    /// The relay refused the message or could not be reached.
    #[error("Relay transport error: {0}")]
    Transport(String),
}

/// Everything that can stop a single delivery from being acknowledged.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Neither a text nor an HTML variant of the template exists.
    #[error("Invalid template [{0}]")]
    TemplateMissing(String),

    /// A template variant exists but could not be read.
    #[error("Failed to read {variant} template {template}: {source}")]
    TemplateRead {
        template: String,
        variant: TemplateVariant,
        #[source]
        source: io::Error,
    },

    /// A template variant is not a valid template, or failed to render.
    #[error("Failed to render {variant} template {template}: {source}")]
    Render {
        template: String,
        variant: TemplateVariant,
        #[source]
        source: minijinja::Error,
    },

    #[error(transparent)]
    Send(#[from] RelayError),

    /// The message was sent but the broker rejected the acknowledgement.
    #[error("Failed to acknowledge delivery: {0}")]
    Acknowledge(#[from] BrokerError),
}

impl DispatchError {
    /// Short, stable label for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode(DecodeError::Invalid(_)) => "validation",
            Self::Decode(_) => "decode",
            Self::TemplateMissing(_) => "template_missing",
            Self::TemplateRead { .. } => "template_read",
            Self::Render { .. } => "render",
            Self::Send(_) => "send",
            Self::Acknowledge(_) => "acknowledge",
        }
    }

    /// Returns `true` if the message itself is at fault, so redelivering it
    /// unchanged will fail the same way.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::TemplateMissing(_)
                | Self::Render { .. }
                | Self::Send(RelayError::InvalidAddress { .. })
        )
    }
}
