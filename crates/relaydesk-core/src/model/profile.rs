// ── User profiles ──

use relaydesk_api::{Document, Fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use super::ids::UserId;
use super::schema::{FieldReader, Record, SCHEMA_VERSION, SCHEMA_VERSION_FIELD, ShapeError};

/// What a signed-in user is allowed to see.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Operator,
    #[default]
    Customer,
}

impl Role {
    pub fn is_operator(self) -> bool {
        matches!(self, Self::Operator)
    }
}

/// A `users/{uid}` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub push_token: Option<String>,
}

impl Profile {
    /// The profile written for an identity that has none yet.
    pub fn provisioned(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            role: Role::Customer,
            push_token: None,
        }
    }

    /// Name shown on outgoing messages: the local part of the email.
    pub fn display_name(&self) -> &str {
        self.email
            .split('@')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("User")
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("email".into(), Value::String(self.email.clone()));
        fields.insert("role".into(), Value::String(self.role.to_string()));
        if let Some(ref token) = self.push_token {
            fields.insert("pushToken".into(), Value::String(token.clone()));
        }
        fields.insert(SCHEMA_VERSION_FIELD.into(), Value::from(SCHEMA_VERSION));
        fields
    }
}

impl Record for Profile {
    fn decode(doc: &Document) -> Result<Self, ShapeError> {
        let r = FieldReader::new(doc)?;

        // Older documents carry `isOperator` instead of `role`.
        let role = match r.opt_string("role")? {
            Some(raw) => raw.parse::<Role>().map_err(|_| ShapeError {
                field: "role".into(),
                reason: format!("unknown role '{raw}'"),
            })?,
            None if r.bool("isOperator")? => Role::Operator,
            None => Role::Customer,
        };

        let push_token = match r.opt_string("pushToken")? {
            Some(t) => Some(t),
            None => r.opt_string("fcmToken")?,
        }
        .filter(|t| !t.is_empty());

        Ok(Self {
            id: UserId::new(doc.id.clone()),
            email: r.string("email")?,
            role,
            push_token,
        })
    }

    fn key(&self) -> &str {
        self.id.as_str()
    }
}
