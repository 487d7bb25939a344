// ── Per-record decoding ──
//
// Every record type decodes through a total function that returns a
// tagged success or failure; nothing is ever cast unchecked. Missing
// fields take their defaults, present fields must have the right type.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use relaydesk_api::{Document, Fields, is_server_timestamp};
use serde_json::Value;

/// Highest `schemaVersion` this build understands. Documents without the
/// field are treated as version 1.
pub const SCHEMA_VERSION: u64 = 1;

/// Field carrying the document schema version.
pub const SCHEMA_VERSION_FIELD: &str = "schemaVersion";

/// Why a document could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field '{field}': {reason}")]
pub struct ShapeError {
    pub field: String,
    pub reason: String,
}

impl ShapeError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

/// A typed view over one document of a synchronized collection.
pub trait Record: Clone + Send + Sync + 'static {
    /// Decode a store document. Must be total: any input yields either
    /// a record or a [`ShapeError`].
    fn decode(doc: &Document) -> Result<Self, ShapeError>;

    /// The document id this record was decoded from.
    fn key(&self) -> &str;
}

/// A timestamp that may still be waiting for the server clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentAt {
    Pending,
    At(DateTime<Utc>),
}

impl SentAt {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Pending => None,
            Self::At(t) => Some(*t),
        }
    }
}

impl std::fmt::Display for SentAt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::At(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

// ── FieldReader ──────────────────────────────────────────────────────

/// Typed accessors over raw document fields.
pub(crate) struct FieldReader<'a> {
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    /// Wrap a document, rejecting schema versions newer than this build.
    pub(crate) fn new(doc: &'a Document) -> Result<Self, ShapeError> {
        match doc.fields.get(SCHEMA_VERSION_FIELD) {
            None | Some(Value::Null) => {}
            Some(v) => {
                let version = v
                    .as_u64()
                    .ok_or_else(|| ShapeError::new(SCHEMA_VERSION_FIELD, "expected an integer"))?;
                if version > SCHEMA_VERSION {
                    return Err(ShapeError::new(
                        SCHEMA_VERSION_FIELD,
                        format!("version {version} is newer than supported {SCHEMA_VERSION}"),
                    ));
                }
            }
        }
        Ok(Self {
            fields: &doc.fields,
        })
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.present(name).is_some()
    }

    pub(crate) fn string(&self, name: &str) -> Result<String, ShapeError> {
        Ok(self.opt_string(name)?.unwrap_or_default())
    }

    pub(crate) fn opt_string(&self, name: &str) -> Result<Option<String>, ShapeError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ShapeError::new(
                name,
                format!("expected a string, got {}", type_name(other)),
            )),
        }
    }

    pub(crate) fn bool(&self, name: &str) -> Result<bool, ShapeError> {
        match self.present(name) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(ShapeError::new(
                name,
                format!("expected a boolean, got {}", type_name(other)),
            )),
        }
    }

    pub(crate) fn int(&self, name: &str) -> Result<i64, ShapeError> {
        match self.present(name) {
            None => Ok(0),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| ShapeError::new(name, format!("expected an integer, got {n}"))),
            Some(other) => Err(ShapeError::new(
                name,
                format!("expected an integer, got {}", type_name(other)),
            )),
        }
    }

    /// A string array read as a set. `None` when the field is absent.
    pub(crate) fn string_set(&self, name: &str) -> Result<Option<BTreeSet<String>>, ShapeError> {
        let Some(value) = self.present(name) else {
            return Ok(None);
        };
        let Value::Array(items) = value else {
            return Err(ShapeError::new(
                name,
                format!("expected a list of strings, got {}", type_name(value)),
            ));
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(ShapeError::new(
                    name,
                    format!("expected string items, got {}", type_name(other)),
                )),
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Some)
    }

    /// A server-assigned timestamp: an RFC 3339 string, epoch
    /// milliseconds, or the unresolved sentinel (pending).
    pub(crate) fn timestamp(&self, name: &str) -> Result<Option<SentAt>, ShapeError> {
        match self.present(name) {
            None => Ok(None),
            Some(v) if is_server_timestamp(v) => Ok(Some(SentAt::Pending)),
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(SentAt::At(t.with_timezone(&Utc))))
                .map_err(|e| ShapeError::new(name, format!("bad timestamp '{s}': {e}"))),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(|t| Some(SentAt::At(t)))
                .ok_or_else(|| ShapeError::new(name, format!("bad epoch millis {n}"))),
            Some(other) => Err(ShapeError::new(
                name,
                format!("expected a timestamp, got {}", type_name(other)),
            )),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
