// ── Document model ──
//
// Paths, documents, snapshots, and queries shared by every store
// implementation. Fields are kept as raw JSON; typed decoding is the
// consumer's job (see `relaydesk-core`'s record decoders).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Raw document fields.
pub type Fields = Map<String, Value>;

/// Key of the server-timestamp sentinel object.
const SERVER_TIMESTAMP_KEY: &str = ".sv";
const SERVER_TIMESTAMP_VALUE: &str = "timestamp";

/// Sentinel value asking the store to stamp the field with its own clock.
///
/// Until the store resolves it, readers see the sentinel itself and should
/// treat the field as pending.
pub fn server_timestamp() -> Value {
    let mut obj = Map::new();
    obj.insert(
        SERVER_TIMESTAMP_KEY.into(),
        Value::String(SERVER_TIMESTAMP_VALUE.into()),
    );
    Value::Object(obj)
}

/// Whether `value` is an unresolved server-timestamp sentinel.
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|o| o.get(SERVER_TIMESTAMP_KEY))
        .and_then(Value::as_str)
        == Some(SERVER_TIMESTAMP_VALUE)
}

// ── Paths ───────────────────────────────────────────────────────────

fn split_segments(raw: &str) -> Result<Vec<String>, Error> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidPath {
            path: raw.into(),
            reason: "path is empty".into(),
        });
    }
    let segments: Vec<String> = trimmed.split('/').map(str::to_owned).collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(Error::InvalidPath {
            path: raw.into(),
            reason: "empty path segment".into(),
        });
    }
    Ok(segments)
}

/// Path to a collection: an odd number of segments (`clients`,
/// `chats/{topic}/messages`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, Error> {
        let raw = raw.as_ref();
        let segments = split_segments(raw)?;
        if segments.len() % 2 == 0 {
            return Err(Error::InvalidPath {
                path: raw.into(),
                reason: "collection paths need an odd number of segments".into(),
            });
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the document `id` inside this collection.
    pub fn doc(&self, id: &str) -> Result<DocumentPath, Error> {
        DocumentPath::new(format!("{}/{id}", self.0))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CollectionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CollectionPath> for String {
    fn from(p: CollectionPath) -> Self {
        p.0
    }
}

/// Path to a single document: an even number of segments (`users/{uid}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, Error> {
        let raw = raw.as_ref();
        let segments = split_segments(raw)?;
        if segments.len() % 2 != 0 {
            return Err(Error::InvalidPath {
                path: raw.into(),
                reason: "document paths need an even number of segments".into(),
            });
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionPath {
        let (parent, _) = self.0.rsplit_once('/').unwrap_or((&self.0, ""));
        CollectionPath(parent.to_owned())
    }

    /// A sub-collection under this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath, Error> {
        CollectionPath::new(format!("{}/{name}", self.0))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DocumentPath> for String {
    fn from(p: DocumentPath) -> Self {
        p.0
    }
}

// ── Documents & snapshots ───────────────────────────────────────────

/// A document as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// A full, ordered replacement of a watched collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic per-listener version, bumped on every delivery.
    pub version: u64,
    pub documents: Vec<Document>,
}

// ── Queries ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Server-side ordering request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }
}

/// A collection subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub collection: CollectionPath,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            order_by: None,
        }
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn collection_path_requires_odd_segments() {
        assert!(CollectionPath::new("clients").is_ok());
        assert!(CollectionPath::new("chats/t1/messages").is_ok());
        assert!(CollectionPath::new("users/u1").is_err());
    }

    #[test]
    fn document_path_requires_even_segments() {
        let p = DocumentPath::new("/users/u1/").unwrap();
        assert_eq!(p.as_str(), "users/u1");
        assert_eq!(p.id(), "u1");
        assert_eq!(p.parent().as_str(), "users");
        assert!(DocumentPath::new("users").is_err());
    }

    #[test]
    fn empty_segments_rejected() {
        assert!(CollectionPath::new("").is_err());
        assert!(DocumentPath::new("users//u1").is_err());
    }

    #[test]
    fn sub_collection_of_document() {
        let topic = DocumentPath::new("chats/t1").unwrap();
        let messages = topic.collection("messages").unwrap();
        assert_eq!(messages.as_str(), "chats/t1/messages");
        assert_eq!(messages.doc("m1").unwrap().as_str(), "chats/t1/messages/m1");
    }

    #[test]
    fn server_timestamp_sentinel_round_trips() {
        let v = server_timestamp();
        assert!(is_server_timestamp(&v));
        assert!(!is_server_timestamp(&Value::String("timestamp".into())));
    }
}
