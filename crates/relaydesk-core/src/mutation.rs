// ── Mutation coordinator ──
//
// Local writes through the remote store, reflected into the local
// mirrors: quick notes only after the store accepts them, new messages
// optimistically with a pending timestamp.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relaydesk_api::{Fields, RemoteStore};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{BusyIndicator, ErrorBus};
use crate::context::SessionContext;
use crate::error::CoreError;
use crate::filter::ClientFilter;
use crate::model::{
    ChatMessage, ClientId, CustomerRecord, MessageId, Profile, SentAt, Topic, TopicId, UserId,
};
use crate::paths;
use crate::sync::CollectionSynchronizer;

// ── Campaign hand-off ────────────────────────────────────────────────

/// A campaign ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRequest {
    pub id: Uuid,
    pub segment: String,
    pub title: String,
    pub body: String,
    pub recipients: Vec<ClientId>,
}

/// Acknowledgement from the fan-out service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignReceipt {
    pub campaign_id: Uuid,
    pub recipients: usize,
    pub accepted_at: DateTime<Utc>,
}

/// External batch service that creates per-customer topics and pushes
/// notifications. Delivery is its responsibility, not the caller's.
#[async_trait]
pub trait CampaignDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        request: CampaignRequest,
    ) -> Result<CampaignReceipt, relaydesk_api::Error>;
}

/// Dispatcher that only records the hand-off.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

#[async_trait]
impl CampaignDispatcher for LoggingDispatcher {
    async fn dispatch(
        &self,
        request: CampaignRequest,
    ) -> Result<CampaignReceipt, relaydesk_api::Error> {
        info!(
            campaign = %request.id,
            segment = %request.segment,
            recipients = request.recipients.len(),
            title = %request.title,
            "campaign handed off"
        );
        Ok(CampaignReceipt {
            campaign_id: request.id,
            recipients: request.recipients.len(),
            accepted_at: Utc::now(),
        })
    }
}

// ── MutationCoordinator ──────────────────────────────────────────────

/// Result of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message_id: MessageId,
    /// `false` when the message was stored but the topic summary update
    /// failed. The message is not rolled back.
    pub summary_updated: bool,
}

/// Applies writes and reflects them locally.
///
/// Obtained from [`SessionController::mutations`](crate::SessionController::mutations).
#[derive(Clone)]
pub struct MutationCoordinator {
    ctx: SessionContext,
    busy: BusyIndicator,
    clients: CollectionSynchronizer<CustomerRecord>,
    selected: Arc<watch::Sender<Option<Arc<CustomerRecord>>>>,
    feeds: Arc<DashMap<TopicId, CollectionSynchronizer<ChatMessage>>>,
}

impl MutationCoordinator {
    pub(crate) fn new(
        ctx: SessionContext,
        busy: BusyIndicator,
        clients: CollectionSynchronizer<CustomerRecord>,
        selected: Arc<watch::Sender<Option<Arc<CustomerRecord>>>>,
        feeds: Arc<DashMap<TopicId, CollectionSynchronizer<ChatMessage>>>,
    ) -> Self {
        Self {
            ctx,
            busy,
            clients,
            selected,
            feeds,
        }
    }

    fn errors(&self) -> &ErrorBus {
        &self.ctx.errors
    }

    /// Patch only `quickNote` on `clients/{id}`. The selected record and
    /// the mirror change only after the store accepts the write.
    pub async fn save_quick_note(&self, id: &ClientId, note: &str) -> Result<(), CoreError> {
        const OP: &str = "Saving the note";

        let path =
            paths::client(id).map_err(|e| self.errors().report(CoreError::mutation(OP, e)))?;
        let mut patch = Fields::new();
        patch.insert("quickNote".into(), Value::String(note.to_owned()));

        let _busy = self.busy.enter();
        if let Err(e) = self.ctx.store.update(&path, patch).await {
            return Err(self.errors().report(CoreError::mutation(OP, e)));
        }

        self.selected.send_if_modified(|selected| {
            let Some(current) = selected.as_ref().filter(|c| c.id == *id) else {
                return false;
            };
            let updated = Arc::new(current.with_quick_note(note));
            *selected = Some(updated);
            true
        });
        self.clients.live().patch(id.as_str(), |c| c.with_quick_note(note));
        debug!(client = %id, "quick note saved");
        Ok(())
    }

    /// Add a message under `chats/{topic}/messages`, then update the topic
    /// summary. Blank text is ignored and returns `Ok(None)`.
    pub async fn send_message(
        &self,
        topic: &TopicId,
        sender: &Profile,
        text: &str,
    ) -> Result<Option<SendOutcome>, CoreError> {
        const OP: &str = "Sending the message";
        const SUMMARY_OP: &str = "Updating the conversation summary";

        if text.trim().is_empty() {
            return Ok(None);
        }

        let collection =
            paths::messages(topic).map_err(|e| self.errors().report(CoreError::mutation(OP, e)))?;
        let sender_name = sender.display_name().to_owned();
        let fields = ChatMessage::outgoing_fields(&sender.id, &sender_name, text);

        let _busy = self.busy.enter();
        let id = match self.ctx.store.add(&collection, fields).await {
            Ok(id) => MessageId::new(id),
            Err(e) => return Err(self.errors().report(CoreError::mutation(OP, e))),
        };

        if let Some(feed) = self.feeds.get(topic) {
            feed.live().push_if_absent(ChatMessage {
                id: id.clone(),
                sender_id: sender.id.clone(),
                sender_name,
                text: text.to_owned(),
                sent_at: SentAt::Pending,
                is_campaign: false,
            });
        }

        let summary = match paths::topic(topic) {
            Ok(path) => self.ctx.store.update(&path, Topic::summary_patch(text)).await,
            Err(e) => Err(e),
        };
        let summary_updated = match summary {
            Ok(()) => true,
            Err(e) => {
                self.errors().publish(&CoreError::mutation(SUMMARY_OP, e));
                false
            }
        };

        debug!(topic = %topic, message = %id, summary_updated, "message sent");
        Ok(Some(SendOutcome {
            message_id: id,
            summary_updated,
        }))
    }

    /// Hand a campaign for every mirrored client tagged `segment` to the
    /// dispatcher. An empty segment performs no writes.
    pub async fn send_campaign(
        &self,
        segment: &str,
        title: &str,
        body: &str,
    ) -> Result<CampaignReceipt, CoreError> {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(CoreError::validation("Segment tag cannot be blank"));
        }
        if title.trim().is_empty() || body.trim().is_empty() {
            return Err(CoreError::validation("Campaign title and body cannot be blank"));
        }

        let filter = ClientFilter::Segment(segment.to_owned());
        let recipients: Vec<ClientId> = self
            .clients
            .snapshot()
            .iter()
            .filter(|c| filter.matches(c))
            .map(|c| c.id.clone())
            .collect();

        if recipients.is_empty() {
            return Err(self.errors().report(CoreError::NoRecipients {
                segment: segment.to_owned(),
            }));
        }

        let request = CampaignRequest {
            id: Uuid::new_v4(),
            segment: segment.to_owned(),
            title: title.to_owned(),
            body: body.to_owned(),
            recipients,
        };

        let _busy = self.busy.enter();
        self.ctx
            .dispatcher
            .dispatch(request)
            .await
            .map_err(|e| self.errors().report(CoreError::mutation("Sending the campaign", e)))
    }

    /// Store a refreshed push token on `users/{uid}`. Best effort: the
    /// write runs in the background and failures are only logged.
    pub fn register_push_token(&self, uid: &UserId, token: &str) -> JoinHandle<()> {
        let store: Arc<dyn RemoteStore> = Arc::clone(&self.ctx.store);
        let uid = uid.clone();
        let token = token.to_owned();
        tokio::spawn(async move {
            let path = match paths::user(&uid) {
                Ok(path) => path,
                Err(e) => {
                    warn!(%uid, error = %e, "push token not registered");
                    return;
                }
            };
            let mut patch = Fields::new();
            patch.insert("pushToken".into(), Value::String(token));
            match store.update(&path, patch).await {
                Ok(()) => debug!(%uid, "push token registered"),
                Err(e) => warn!(%uid, error = %e, "push token not registered"),
            }
        })
    }
}
