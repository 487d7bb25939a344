// ── Session controller ──
//
// Owns the session state machine and everything scoped to a signed-in
// session: the role-gated client synchronizer, per-topic message feeds,
// the selected client and the client search query. All session
// transitions go through here.

mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use relaydesk_api::{Identity, OrderBy, Query};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use state::{Session, SessionPhase};

use self::state::SessionEvent;
use crate::bus::{BusyIndicator, ErrorBus};
use crate::context::SessionContext;
use crate::error::CoreError;
use crate::filter::FilteredView;
use crate::model::{
    ChatMessage, ClientId, CustomerRecord, Profile, Record, Role, SENT_AT_FIELD, TopicId, UserId,
};
use crate::mutation::MutationCoordinator;
use crate::paths;
use crate::sync::{CollectionSynchronizer, RecordStream};

/// Drives sign-in, profile resolution and the session-scoped syncs.
///
/// Cheaply cloneable; clones share one session. Dropping the last clone
/// cancels every subscription the session started.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    ctx: SessionContext,
    session: watch::Sender<Session>,
    /// Held for the whole of a login, restore or logout.
    gate: Mutex<()>,
    scope: CancellationToken,
    busy: BusyIndicator,
    clients: CollectionSynchronizer<CustomerRecord>,
    feeds: Arc<DashMap<TopicId, CollectionSynchronizer<ChatMessage>>>,
    selected: Arc<watch::Sender<Option<Arc<CustomerRecord>>>>,
    /// Bumped each time the session scope is released. Guarded by the
    /// `selected` write lock.
    epoch: AtomicU64,
    client_query: watch::Sender<String>,
}

impl SessionInner {
    /// Feed `event` to the state machine. Events that are not valid in
    /// the current phase are dropped and logged.
    fn transition(&self, event: SessionEvent) -> bool {
        let name: &'static str = (&event).into();
        self.session.send_if_modified(|current| match current.next(event) {
            Some(next) => {
                debug!(event = name, from = ?current.phase, to = ?next.phase, "session transition");
                *current = next;
                true
            }
            None => {
                warn!(event = name, phase = ?current.phase, "ignored session event");
                false
            }
        })
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

impl SessionController {
    pub fn new(ctx: SessionContext) -> Result<Self, CoreError> {
        let scope = CancellationToken::new();
        let clients_path = paths::clients().map_err(|e| CoreError::Config {
            message: e.to_string(),
        })?;
        let clients = CollectionSynchronizer::new(
            Arc::clone(&ctx.store),
            ctx.errors.clone(),
            clients_path,
            &scope,
        );
        let (session, _) = watch::channel(Session::signed_out());
        let (selected, _) = watch::channel(None);
        let (client_query, _) = watch::channel(String::new());

        Ok(Self {
            inner: Arc::new(SessionInner {
                ctx,
                session,
                gate: Mutex::new(()),
                scope,
                busy: BusyIndicator::new(),
                clients,
                feeds: Arc::new(DashMap::new()),
                selected: Arc::new(selected),
                epoch: AtomicU64::new(0),
                client_query,
            }),
        })
    }

    // ── Sign-in ──────────────────────────────────────────────────────

    /// Sign in and resolve the profile. Returns only once the session is
    /// `Ready`, or has fallen back to `SignedOut` after a reported error.
    ///
    /// Blank credentials are rejected before any I/O. A login while
    /// another login, restore or logout is running fails with
    /// [`CoreError::SessionBusy`].
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<Profile, CoreError> {
        let email = email.trim();
        if email.is_empty() || password.expose_secret().trim().is_empty() {
            return Err(CoreError::validation("Email and password are required"));
        }

        let Ok(_gate) = self.inner.gate.try_lock() else {
            return Err(CoreError::SessionBusy);
        };
        let _busy = self.inner.busy.enter();

        if self.session().phase != SessionPhase::SignedOut {
            debug!("replacing the current session");
            self.release_all().await;
            self.inner.transition(SessionEvent::Reset);
        }

        self.inner.transition(SessionEvent::Begin);
        let identity = match self.inner.ctx.auth.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(e) => {
                let message = match e {
                    relaydesk_api::Error::Authentication { message } => message,
                    other => other.to_string(),
                };
                return Err(self.fail(CoreError::Auth { message }));
            }
        };
        info!(uid = %identity.uid, "signed in");

        self.inner.transition(SessionEvent::SignedIn(identity.clone()));
        self.finish_resolution(&identity).await
    }

    /// Resume a session the auth service still holds. `Ok(None)` when no
    /// identity is signed in.
    pub async fn restore(&self) -> Result<Option<Profile>, CoreError> {
        let Ok(_gate) = self.inner.gate.try_lock() else {
            return Err(CoreError::SessionBusy);
        };
        if self.session().phase != SessionPhase::SignedOut {
            return Ok(self.profile());
        }
        let Some(identity) = self.inner.ctx.auth.current_identity() else {
            return Ok(None);
        };
        let _busy = self.inner.busy.enter();

        info!(uid = %identity.uid, "restoring session");
        self.inner.transition(SessionEvent::Restored(identity.clone()));
        self.finish_resolution(&identity).await.map(Some)
    }

    /// Read `users/{uid}`, provisioning a `Customer` profile when the
    /// document does not exist. Does not move the session.
    pub async fn resolve_profile(&self, identity: &Identity) -> Result<Profile, CoreError> {
        let load_error = |message: String| CoreError::ProfileLoad {
            uid: identity.uid.clone(),
            message,
        };
        let uid = UserId::from(identity.uid.as_str());
        let path = paths::user(&uid).map_err(|e| load_error(e.to_string()))?;
        let store = &self.inner.ctx.store;

        if let Some(doc) = store.get(&path).await.map_err(|e| load_error(e.to_string()))? {
            return Profile::decode(&doc).map_err(|e| load_error(e.to_string()));
        }

        let profile = Profile::provisioned(uid, identity.email.clone());
        store
            .set(&path, profile.to_fields())
            .await
            .map_err(|e| load_error(e.to_string()))?;
        info!(uid = %profile.id, role = %profile.role, "provisioned profile");
        Ok(profile)
    }

    async fn finish_resolution(&self, identity: &Identity) -> Result<Profile, CoreError> {
        let profile = match self.resolve_profile(identity).await {
            Ok(profile) => profile,
            Err(err) => {
                if let Err(e) = self.inner.ctx.auth.sign_out().await {
                    debug!(error = %e, "sign-out after failed profile load");
                }
                return Err(self.fail(err));
            }
        };

        let role = profile.role;
        if !self
            .inner
            .transition(SessionEvent::ProfileResolved(profile.clone()))
        {
            return Err(self.fail(CoreError::ProfileLoad {
                uid: identity.uid.clone(),
                message: "profile does not belong to the signed-in identity".into(),
            }));
        }
        info!(uid = %profile.id, %role, "session ready");

        self.apply_role_gate(role).await;
        Ok(profile)
    }

    /// Publish `err`, pass through `Error`, and land in `SignedOut`.
    fn fail(&self, err: CoreError) -> CoreError {
        self.inner.transition(SessionEvent::Failed(err.kind()));
        self.inner.ctx.errors.publish(&err);
        self.inner.transition(SessionEvent::Reset);
        err
    }

    /// Operators mirror `clients`; everyone else must not.
    async fn apply_role_gate(&self, role: Role) {
        let clients = &self.inner.clients;
        if role.is_operator() {
            let query = Query::collection(clients.collection().clone());
            if let Err(e) = clients.subscribe(query).await {
                debug!(error = %e, "clients sync not started");
            }
        } else {
            clients.unsubscribe().await;
        }
    }

    // ── Sign-out ─────────────────────────────────────────────────────

    /// Cancel every session subscription, sign out remotely and reset.
    ///
    /// Waits for an in-flight login to settle first. A failed remote
    /// sign-out is logged; the local session is reset regardless.
    pub async fn logout(&self) {
        let _gate = self.inner.gate.lock().await;
        self.release_all().await;
        if let Err(e) = self.inner.ctx.auth.sign_out().await {
            warn!(error = %e, "remote sign-out failed");
        }
        self.inner.transition(SessionEvent::Reset);
        info!("signed out");
    }

    /// Tear the session scope down. Later subscriptions fail with a
    /// reported sync error.
    pub async fn shutdown(&self) {
        let _gate = self.inner.gate.lock().await;
        self.inner.scope.cancel();
        self.release_all().await;
        self.inner.transition(SessionEvent::Reset);
        debug!("session scope cancelled");
    }

    async fn release_all(&self) {
        self.inner.clients.unsubscribe().await;

        let feeds: Vec<_> = self
            .inner
            .feeds
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.inner.feeds.clear();
        for feed in feeds {
            feed.unsubscribe().await;
        }

        self.inner.selected.send_modify(|current| {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            *current = None;
        });
    }

    // ── Session state ────────────────────────────────────────────────

    pub fn session(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.inner.session.borrow().profile.clone()
    }

    fn ready_profile(&self) -> Result<Profile, CoreError> {
        let session = self.inner.session.borrow();
        match (&session.phase, &session.profile) {
            (SessionPhase::Ready(_), Some(profile)) => Ok(profile.clone()),
            _ => Err(CoreError::NotSignedIn),
        }
    }

    pub fn errors(&self) -> &ErrorBus {
        &self.inner.ctx.errors
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.is_busy()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    // ── Clients ──────────────────────────────────────────────────────

    /// Live view of the client mirror. Empty unless the session is an
    /// operator session.
    pub fn clients(&self) -> RecordStream<CustomerRecord> {
        self.inner.clients.stream()
    }

    /// The client synchronizer itself, for subscription bookkeeping.
    pub fn client_sync(&self) -> &CollectionSynchronizer<CustomerRecord> {
        &self.inner.clients
    }

    /// The client mirror filtered by the current search query.
    pub fn client_view(&self) -> FilteredView {
        FilteredView::new(
            self.inner.clients.live().subscribe(),
            self.inner.client_query.subscribe(),
        )
    }

    pub fn set_client_query(&self, query: impl Into<String>) {
        self.inner.client_query.send_replace(query.into());
    }

    /// Select a client for the details view. Served from the mirror when
    /// present, otherwise from a point read. A failed or malformed read
    /// is reported and the previous selection stays. A read that outlives
    /// its session is discarded with [`CoreError::NotSignedIn`].
    pub async fn select_client(
        &self,
        id: &ClientId,
    ) -> Result<Option<Arc<CustomerRecord>>, CoreError> {
        self.ready_profile()?;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);

        if let Some(record) = self.inner.clients.get(id.as_str()) {
            self.inner.selected.send_replace(Some(Arc::clone(&record)));
            return Ok(Some(record));
        }

        let errors = self.errors();
        let path = paths::client(id).map_err(|e| CoreError::validation(e.to_string()))?;
        let doc = self
            .inner
            .ctx
            .store
            .get(&path)
            .await
            .map_err(|e| errors.report(CoreError::sync(paths::CLIENTS, e)))?;

        let Some(doc) = doc else {
            debug!(client = %id, "client not found");
            self.commit_selection(epoch, None)?;
            return Ok(None);
        };
        let record = CustomerRecord::decode(&doc).map_err(|e| {
            errors.report(CoreError::DataShape {
                collection: paths::CLIENTS.into(),
                id: id.to_string(),
                reason: e.to_string(),
            })
        })?;

        let record = Arc::new(record);
        self.commit_selection(epoch, Some(Arc::clone(&record)))?;
        Ok(Some(record))
    }

    /// Store `record` as the selection unless the session was released
    /// since `epoch` was read.
    fn commit_selection(
        &self,
        epoch: u64,
        record: Option<Arc<CustomerRecord>>,
    ) -> Result<(), CoreError> {
        let mut current_session = true;
        self.inner.selected.send_if_modified(|current| {
            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                current_session = false;
                return false;
            }
            *current = record;
            true
        });
        if current_session {
            Ok(())
        } else {
            debug!("session ended during client read, selection dropped");
            Err(CoreError::NotSignedIn)
        }
    }

    pub fn selected_client(&self) -> Option<Arc<CustomerRecord>> {
        self.inner.selected.borrow().clone()
    }

    pub fn subscribe_selected(&self) -> watch::Receiver<Option<Arc<CustomerRecord>>> {
        self.inner.selected.subscribe()
    }

    // ── Messages ─────────────────────────────────────────────────────

    /// Mirror `chats/{topic}/messages` in `sentAt` order. One feed per
    /// topic; asking again returns the live one.
    pub async fn messages(&self, topic: &TopicId) -> Result<RecordStream<ChatMessage>, CoreError> {
        self.ready_profile()?;

        let collection = paths::messages(topic).map_err(|e| CoreError::validation(e.to_string()))?;
        let feed = self
            .inner
            .feeds
            .entry(topic.clone())
            .or_insert_with(|| {
                CollectionSynchronizer::new(
                    Arc::clone(&self.inner.ctx.store),
                    self.inner.ctx.errors.clone(),
                    collection.clone(),
                    &self.inner.scope,
                )
            })
            .clone();

        feed.subscribe(Query::collection(collection).order_by(OrderBy::asc(SENT_AT_FIELD)))
            .await
    }

    /// The synchronizer behind an open feed, if any.
    pub fn message_sync(&self, topic: &TopicId) -> Option<CollectionSynchronizer<ChatMessage>> {
        self.inner.feeds.get(topic).map(|feed| feed.value().clone())
    }

    /// Stop and forget the feed for `topic`.
    pub async fn close_messages(&self, topic: &TopicId) {
        if let Some((_, feed)) = self.inner.feeds.remove(topic) {
            feed.unsubscribe().await;
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub fn mutations(&self) -> MutationCoordinator {
        MutationCoordinator::new(
            self.inner.ctx.clone(),
            self.inner.busy.clone(),
            self.inner.clients.clone(),
            Arc::clone(&self.inner.selected),
            Arc::clone(&self.inner.feeds),
        )
    }

    /// Send `text` to `topic` as the signed-in user.
    pub async fn send_message(
        &self,
        topic: &TopicId,
        text: &str,
    ) -> Result<Option<crate::mutation::SendOutcome>, CoreError> {
        let profile = self.ready_profile()?;
        self.mutations().send_message(topic, &profile, text).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use relaydesk_api::memory::{MemoryAuth, MemoryStore};

    use super::*;
    use crate::error::ErrorKind;

    fn controller() -> (SessionController, Arc<MemoryStore>, Arc<MemoryAuth>) {
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(MemoryAuth::new());
        let ctx = SessionContext::new(store.clone(), auth.clone());
        (SessionController::new(ctx).unwrap(), store, auth)
    }

    #[tokio::test]
    async fn rejected_password_lands_signed_out_with_auth_signal() {
        let (session, _store, auth) = controller();
        auth.register("ana@x.io", "right");

        let err = session
            .login("ana@x.io", &SecretString::from("wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(session.session(), Session::signed_out());
        assert_eq!(session.errors().latest().unwrap().kind, ErrorKind::Auth);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn messages_need_a_ready_session() {
        let (session, _store, _auth) = controller();
        let Err(err) = session.messages(&TopicId::from("t1")).await else {
            panic!("expected NotSignedIn");
        };
        assert!(matches!(err, CoreError::NotSignedIn));
    }

    #[tokio::test]
    async fn restore_without_identity_is_a_no_op() {
        let (session, _store, _auth) = controller();
        assert!(session.restore().await.unwrap().is_none());
        assert_eq!(session.session().phase, SessionPhase::SignedOut);
    }
}
