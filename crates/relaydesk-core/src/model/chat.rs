// ── Chat messages and topics ──

use relaydesk_api::{Document, Fields, server_timestamp};
use serde_json::Value;

use super::ids::{ClientId, MessageId, TopicId, UserId};
use super::schema::{FieldReader, Record, SCHEMA_VERSION, SCHEMA_VERSION_FIELD, SentAt, ShapeError};

/// Field the message feed is ordered by.
pub const SENT_AT_FIELD: &str = "sentAt";

/// A `chats/{topic}/messages/{id}` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
    pub sent_at: SentAt,
    pub is_campaign: bool,
}

impl ChatMessage {
    /// Fields for a new message; the store stamps `sentAt`.
    pub(crate) fn outgoing_fields(sender_id: &UserId, sender_name: &str, text: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("senderId".into(), Value::String(sender_id.to_string()));
        fields.insert("senderName".into(), Value::String(sender_name.to_owned()));
        fields.insert("text".into(), Value::String(text.to_owned()));
        fields.insert(SENT_AT_FIELD.into(), server_timestamp());
        fields.insert("isCampaign".into(), Value::Bool(false));
        fields.insert(SCHEMA_VERSION_FIELD.into(), Value::from(SCHEMA_VERSION));
        fields
    }
}

impl Record for ChatMessage {
    fn decode(doc: &Document) -> Result<Self, ShapeError> {
        let r = FieldReader::new(doc)?;

        // Older documents carry epoch millis under `timestamp`.
        let sent_at = match r.timestamp(SENT_AT_FIELD)? {
            Some(t) => t,
            None => r.timestamp("timestamp")?.unwrap_or(SentAt::Pending),
        };

        Ok(Self {
            id: MessageId::new(doc.id.clone()),
            sender_id: UserId::new(r.string("senderId")?),
            sender_name: r.string("senderName")?,
            text: r.string("text")?,
            sent_at,
            is_campaign: r.bool("isCampaign")?,
        })
    }

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// A `chats/{id}` summary document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: TopicId,
    pub operator_id: Option<UserId>,
    pub client_id: Option<ClientId>,
    pub campaign_id: Option<String>,
    pub last_message: String,
    pub last_message_at: Option<SentAt>,
}

impl Topic {
    /// Patch applied to the summary after a message is added.
    pub(crate) fn summary_patch(text: &str) -> Fields {
        let mut patch = Fields::new();
        patch.insert("lastMessage".into(), Value::String(text.to_owned()));
        patch.insert("lastMessageAt".into(), server_timestamp());
        patch
    }
}

impl Record for Topic {
    fn decode(doc: &Document) -> Result<Self, ShapeError> {
        let r = FieldReader::new(doc)?;
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());

        let last_message_at = if r.has("lastMessageAt") {
            r.timestamp("lastMessageAt")?
        } else {
            r.timestamp("lastTimestamp")?
        };

        Ok(Self {
            id: TopicId::new(doc.id.clone()),
            operator_id: non_empty(r.opt_string("operatorId")?).map(UserId::new),
            client_id: non_empty(r.opt_string("clientId")?).map(ClientId::new),
            campaign_id: non_empty(r.opt_string("campaignId")?),
            last_message: r.string("lastMessage")?,
            last_message_at,
        })
    }

    fn key(&self) -> &str {
        self.id.as_str()
    }
}
