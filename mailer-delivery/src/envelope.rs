use serde_json::{Map, Value};

use crate::{DecodeError, EmailCommand, decode};

/// A delivery body unwrapped into its top-level JSON object.
///
/// Lives only for the duration of one dispatch: it is built from the wire
/// body, turned into an [`EmailCommand`] and discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEnvelope {
    id: String,
    payload: Map<String, Value>,
}

impl QueueEnvelope {
    /// Parse a raw delivery body.
    ///
    /// # Errors
    /// If the body is not JSON, or its top level is not an object
    pub fn parse(id: impl Into<String>, raw: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice(raw)? {
            Value::Object(payload) => Ok(Self {
                id: id.into(),
                payload,
            }),
            other => Err(DecodeError::NotAMapping(kind(&other))),
        }
    }

    /// Broker-assigned message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Validate the payload and build the command it describes.
    ///
    /// # Errors
    /// If the payload violates the request schema
    pub fn into_command(self) -> Result<EmailCommand, DecodeError> {
        decode::from_mapping(&self.payload).map_err(DecodeError::from)
    }
}

pub(crate) const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_object() {
        let envelope = QueueEnvelope::parse("m-1", br#"{"template": "welcome"}"#).unwrap();

        assert_eq!(envelope.id(), "m-1");
        assert_eq!(envelope.payload().len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        let err = QueueEnvelope::parse("m-1", b"{ template").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        for (body, expected) in [
            (&b"[1, 2]"[..], "an array"),
            (&b"\"welcome\""[..], "a string"),
            (&b"null"[..], "null"),
            (&b"42"[..], "a number"),
        ] {
            let err = QueueEnvelope::parse("m-1", body).unwrap_err();
            assert!(
                matches!(err, DecodeError::NotAMapping(kind) if kind == expected),
                "{err}"
            );
        }
    }
}
