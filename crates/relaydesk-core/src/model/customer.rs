// ── Customer records ──

use std::collections::BTreeSet;

use relaydesk_api::Document;
use serde::{Deserialize, Serialize};

use super::ids::ClientId;
use super::schema::{FieldReader, Record, ShapeError};

/// A `clients/{id}` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: ClientId,
    pub name: String,
    pub email: String,
    pub tags: BTreeSet<String>,
    pub score: i64,
    pub status_tags: BTreeSet<String>,
    pub quick_note: String,
}

impl CustomerRecord {
    /// Exact tag membership, as used for campaign segments.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn with_quick_note(&self, note: &str) -> Self {
        Self {
            quick_note: note.to_owned(),
            ..self.clone()
        }
    }
}

impl Record for CustomerRecord {
    fn decode(doc: &Document) -> Result<Self, ShapeError> {
        let r = FieldReader::new(doc)?;

        // Older documents carry a single `status` string.
        let status_tags = match r.string_set("statusTags")? {
            Some(tags) => tags,
            None => r
                .opt_string("status")?
                .filter(|s| !s.trim().is_empty())
                .into_iter()
                .collect(),
        };

        Ok(Self {
            id: ClientId::new(doc.id.clone()),
            name: r.string("name")?,
            email: r.string("email")?,
            tags: r.string_set("tags")?.unwrap_or_default(),
            score: r.int("score")?,
            status_tags,
            quick_note: r.string("quickNote")?,
        })
    }

    fn key(&self) -> &str {
        self.id.as_str()
    }
}
