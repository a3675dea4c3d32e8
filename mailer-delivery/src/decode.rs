//! Schema-driven decoding of email requests.
//!
//! Each top-level key of the payload is case-folded and classified into an
//! [`Entry`]: one of the command's scalar fields, one of its two mappings,
//! or an implicit template parameter. Classification never stops early;
//! every violation is collected, so a bad request is reported the same way
//! no matter which key happens to come first.
//!
//! Once every key is classified, implicit parameters are applied first and
//! an explicit `params` block on top, so `{"foo": "a", "params": {"foo": "b"}}`
//! yields `foo = "b"`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{DecodeError, EmailCommand, QueueEnvelope, ValidationError, ValidationErrors};

/// A field of the request schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Template,
    Locale,
    To,
    From,
    Cc,
    Bcc,
    Params,
    Headers,
}

impl Field {
    /// Fields a command cannot be built without, in reporting order.
    pub const REQUIRED: [Self; 3] = [Self::Template, Self::To, Self::From];

    /// Match a case-folded key against the schema.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "template" => Self::Template,
            "locale" => Self::Locale,
            "to" => Self::To,
            "from" => Self::From,
            "cc" => Self::Cc,
            "bcc" => Self::Bcc,
            "params" => Self::Params,
            "headers" => Self::Headers,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Locale => "locale",
            Self::To => "to",
            Self::From => "from",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
            Self::Params => "params",
            Self::Headers => "headers",
        }
    }

    const fn is_mapping(self) -> bool {
        matches!(self, Self::Params | Self::Headers)
    }
}

/// One top-level payload entry, classified.
#[derive(Debug, PartialEq)]
enum Entry {
    Scalar(Field, String),
    Mapping(Field, Vec<(String, String)>),
    /// An unrecognised key with a string value, used as a template parameter.
    Implicit(String, String),
    /// An unrecognised key with a non-string value.
    Ignored,
}

fn classify(key: &str, value: &Value) -> Result<Entry, ValidationError> {
    let key = key.to_lowercase();

    let Some(field) = Field::from_key(&key) else {
        return Ok(match value {
            Value::String(value) => Entry::Implicit(key, value.clone()),
            _ => Entry::Ignored,
        });
    };

    if field.is_mapping() {
        let Value::Object(inner) = value else {
            return Err(ValidationError::InvalidType {
                field: field.name(),
                expected: "an object",
            });
        };

        let pairs = inner
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_str()
                    .map(|value| (key.to_lowercase(), value.to_string()))
            })
            .collect();

        return Ok(Entry::Mapping(field, pairs));
    }

    value.as_str().map_or(
        Err(ValidationError::InvalidType {
            field: field.name(),
            expected: "a string",
        }),
        |value| Ok(Entry::Scalar(field, value.trim().to_string())),
    )
}

/// Decode a raw delivery body into a validated command.
///
/// Pure: decoding the same body twice yields equal commands.
///
/// # Errors
/// If the body is not a JSON object, or the object violates the schema
pub fn decode(raw: &[u8]) -> Result<EmailCommand, DecodeError> {
    QueueEnvelope::parse(String::new(), raw)?.into_command()
}

pub(crate) fn from_mapping(payload: &Map<String, Value>) -> Result<EmailCommand, ValidationErrors> {
    let mut errors = Vec::new();
    let mut invalid = Vec::new();
    let mut command = EmailCommand::default();
    let mut implicit = BTreeMap::new();
    let mut explicit = Vec::new();

    for (key, value) in payload {
        match classify(key, value) {
            Ok(Entry::Scalar(field, value)) => {
                let value = Some(value).filter(|value| !value.is_empty());
                match field {
                    Field::Template => command.template = value.unwrap_or_default(),
                    Field::To => command.to = value.unwrap_or_default(),
                    Field::From => command.from = value.unwrap_or_default(),
                    Field::Cc => command.cc = value,
                    Field::Bcc => command.bcc = value,
                    Field::Locale => command.locale = value,
                    Field::Params | Field::Headers => {}
                }
            }
            Ok(Entry::Mapping(Field::Headers, pairs)) => command.headers.extend(pairs),
            Ok(Entry::Mapping(_, pairs)) => explicit.extend(pairs),
            Ok(Entry::Implicit(key, value)) => {
                implicit.insert(key, value);
            }
            Ok(Entry::Ignored) => {}
            Err(error) => {
                invalid.push(error.field());
                errors.push(error);
            }
        }
    }

    let missing = |field: Field| match field {
        Field::Template => command.template.is_empty(),
        Field::To => command.to.is_empty(),
        Field::From => command.from.is_empty(),
        _ => false,
    };

    errors.extend(
        Field::REQUIRED
            .into_iter()
            .filter(|field| missing(*field) && !invalid.contains(&field.name()))
            .map(|field| ValidationError::MissingField(field.name())),
    );

    if !errors.is_empty() {
        return Err(ValidationErrors::new(errors));
    }

    command.params = implicit;
    command.params.extend(explicit);

    Ok(command)
}
