#![allow(clippy::unwrap_used)]

// End-to-end session scenarios against the in-memory store and auth.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use relaydesk_api::memory::{MemoryAuth, MemoryStore, Operation};
use relaydesk_api::{Identity, Query, RemoteAuth};
use relaydesk_core::{
    CampaignDispatcher, CampaignReceipt, CampaignRequest, ClientId, CoreError, ErrorKind, Role,
    SessionContext, SessionController, SessionPhase, TopicId, UserId,
};
use secrecy::SecretString;
use serde_json::{Value, json};

const PASSWORD: &str = "hunter2";

struct Harness {
    store: Arc<MemoryStore>,
    auth: Arc<MemoryAuth>,
    session: SessionController,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(MemoryAuth::new());
    let ctx = SessionContext::new(store.clone(), auth.clone());
    Harness {
        session: SessionController::new(ctx).unwrap(),
        store,
        auth,
    }
}

fn with_dispatcher(dispatcher: Arc<dyn CampaignDispatcher>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(MemoryAuth::new());
    let ctx = SessionContext::new(store.clone(), auth.clone()).with_dispatcher(dispatcher);
    Harness {
        session: SessionController::new(ctx).unwrap(),
        store,
        auth,
    }
}

fn password() -> SecretString {
    SecretString::from(PASSWORD)
}

fn account(h: &Harness, email: &str, role: Option<&str>) -> Identity {
    let identity = h.auth.register(email, PASSWORD);
    if let Some(role) = role {
        h.store
            .seed("users", &identity.uid, json!({"email": email, "role": role}));
    }
    identity
}

fn seed_clients(h: &Harness) {
    h.store.seed(
        "clients",
        "c1",
        json!({"name": "Ana", "tags": ["VIP"], "quickNote": "prefers email"}),
    );
    h.store
        .seed("clients", "c2", json!({"name": "Bob", "tags": ["New"]}));
}

async fn login_operator(h: &Harness) -> Identity {
    let identity = account(h, "op@relaydesk.io", Some("operator"));
    h.session.login("op@relaydesk.io", &password()).await.unwrap();
    identity
}

async fn settle(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// ── Session lifecycle ────────────────────────────────────────────────

#[tokio::test]
async fn ready_is_never_observed_without_profile() {
    let h = harness();
    account(&h, "op@relaydesk.io", Some("operator"));

    let mut rx = h.session.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let s = rx.borrow_and_update().clone();
            let ready = s.is_ready();
            seen.push(s);
            if ready {
                break;
            }
        }
        seen
    });

    h.session.login("op@relaydesk.io", &password()).await.unwrap();
    let seen = observer.await.unwrap();

    assert!(seen.last().unwrap().is_ready());
    for s in &seen {
        if s.is_ready() {
            assert!(s.profile.is_some());
        }
    }
}

#[tokio::test]
async fn new_user_is_provisioned_as_customer() {
    let h = harness();
    let identity = account(&h, "new@relaydesk.io", None);

    let profile = h.session.login("new@relaydesk.io", &password()).await.unwrap();

    assert_eq!(profile.role, Role::Customer);
    assert_eq!(h.session.session().phase, SessionPhase::Ready(Role::Customer));
    let stored = h.store.document(&format!("users/{}", identity.uid)).unwrap();
    assert_eq!(stored["role"], json!("customer"));
    assert_eq!(h.store.subscribe_calls(), 0);
}

#[tokio::test]
async fn customer_login_never_mirrors_clients() {
    let h = harness();
    seed_clients(&h);
    account(&h, "ana@relaydesk.io", Some("customer"));

    h.session.login("ana@relaydesk.io", &password()).await.unwrap();

    assert_eq!(h.store.subscribe_calls(), 0);
    assert!(!h.session.client_sync().is_active().await);
    assert!(h.session.clients().current().is_empty());
}

#[tokio::test]
async fn legacy_operator_flag_is_honoured() {
    let h = harness();
    let identity = h.auth.register("old@relaydesk.io", PASSWORD);
    h.store.seed(
        "users",
        &identity.uid,
        json!({"email": "old@relaydesk.io", "isOperator": true}),
    );

    let profile = h.session.login("old@relaydesk.io", &password()).await.unwrap();
    assert_eq!(profile.role, Role::Operator);
    assert!(h.session.client_sync().is_active().await);
}

#[tokio::test]
async fn blank_credentials_never_reach_network_or_bus() {
    let h = harness();

    for (email, pw) in [("", PASSWORD), ("  ", PASSWORD), ("a@b.io", ""), ("a@b.io", "   ")] {
        let err = h
            .session
            .login(email, &SecretString::from(pw))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    assert_eq!(h.auth.sign_in_calls(), 0);
    assert!(h.session.errors().latest().is_none());
    assert_eq!(h.session.errors().published_count(), 0);
    assert_eq!(h.session.session().phase, SessionPhase::SignedOut);
}

#[tokio::test]
async fn second_login_during_profile_resolution_is_busy() {
    let h = harness();
    account(&h, "op@relaydesk.io", Some("operator"));

    let pause = h.store.pause();
    let first = {
        let session = h.session.clone();
        tokio::spawn(async move { session.login("op@relaydesk.io", &password()).await })
    };

    let mut rx = h.session.subscribe();
    rx.wait_for(|s| s.phase == SessionPhase::ProfileResolving)
        .await
        .unwrap();
    assert!(h.session.is_busy());

    let err = h
        .session
        .login("op@relaydesk.io", &password())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SessionBusy));
    assert!(h.session.errors().latest().is_none());

    drop(pause);
    let profile = first.await.unwrap().unwrap();
    assert_eq!(profile.role, Role::Operator);
    assert_eq!(h.auth.sign_in_calls(), 1);
    assert!(!h.session.is_busy());
}

#[tokio::test]
async fn profile_load_failure_signs_out() {
    let h = harness();
    account(&h, "op@relaydesk.io", Some("operator"));
    h.store.fail_next(Operation::Get, "permission denied");

    let err = h
        .session
        .login("op@relaydesk.io", &password())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProfileLoad);
    assert_eq!(h.session.session().phase, SessionPhase::SignedOut);
    assert!(h.auth.current_identity().is_none());
    assert_eq!(
        h.session.errors().latest().unwrap().kind,
        ErrorKind::ProfileLoad
    );
}

#[tokio::test]
async fn restore_resumes_without_sign_in() {
    let h = harness();
    let identity = account(&h, "op@relaydesk.io", Some("operator"));
    h.auth.set_current(Some(identity));

    let profile = h.session.restore().await.unwrap().unwrap();

    assert_eq!(profile.role, Role::Operator);
    assert_eq!(h.session.session().phase, SessionPhase::Ready(Role::Operator));
    assert_eq!(h.auth.sign_in_calls(), 0);
}

#[tokio::test]
async fn logout_releases_every_listener() {
    let h = harness();
    seed_clients(&h);
    login_operator(&h).await;
    h.session.messages(&TopicId::from("t1")).await.unwrap();
    let store = Arc::clone(&h.store);
    settle(|| store.active_listeners() == 2).await;

    h.session.logout().await;

    settle(|| store.active_listeners() == 0).await;
    assert_eq!(h.session.session().phase, SessionPhase::SignedOut);
    assert!(h.session.clients().current().is_empty());
    assert!(h.session.selected_client().is_none());
    assert!(h.auth.current_identity().is_none());
}

// ── Clients ──────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_subscribe_keeps_one_listener() {
    let h = harness();
    seed_clients(&h);
    login_operator(&h).await;

    let clients = h.session.client_sync();
    clients
        .subscribe(Query::collection(clients.collection().clone()))
        .await
        .unwrap();

    assert_eq!(h.store.subscribe_calls(), 1);
    let store = Arc::clone(&h.store);
    settle(|| store.active_listeners() == 1).await;
}

#[tokio::test]
async fn filter_follows_query_and_keeps_order() {
    let h = harness();
    seed_clients(&h);
    login_operator(&h).await;
    h.session
        .clients()
        .wait_for(|c| c.len() == 2)
        .await
        .unwrap();

    let mut view = h.session.client_view();
    assert_eq!(names(view.current()), ["Ana", "Bob"]);

    h.session.set_client_query("vip");
    let filtered = view.changed().await.unwrap();
    assert_eq!(names(&filtered), ["Ana"]);

    h.session.set_client_query("");
    let all = view.changed().await.unwrap();
    assert_eq!(names(&all), ["Ana", "Bob"]);
}

fn names(records: &[Arc<relaydesk_core::CustomerRecord>]) -> Vec<&str> {
    records.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn malformed_client_is_dropped_and_reported() {
    let h = harness();
    seed_clients(&h);
    h.store
        .seed("clients", "c3", json!({"name": "Eve", "score": "high"}));
    login_operator(&h).await;

    let snap = h
        .session
        .clients()
        .wait_for(|c| c.len() == 2)
        .await
        .unwrap();
    assert_eq!(names(&snap), ["Ana", "Bob"]);
    let signal = h.session.errors().latest().unwrap();
    assert_eq!(signal.kind, ErrorKind::DataShape);
}

#[tokio::test]
async fn select_falls_back_to_point_read() {
    let h = harness();
    account(&h, "ana@relaydesk.io", Some("customer"));
    h.session.login("ana@relaydesk.io", &password()).await.unwrap();
    h.store
        .seed("clients", "c9", json!({"name": "Zoe", "tags": ["VIP"]}));

    let record = h
        .session
        .select_client(&ClientId::from("c9"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "Zoe");
    assert_eq!(h.session.selected_client().unwrap().id.as_str(), "c9");

    h.store.fail_next(Operation::Get, "offline");
    let err = h
        .session
        .select_client(&ClientId::from("c10"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sync);
    assert_eq!(h.session.selected_client().unwrap().id.as_str(), "c9");
}

#[tokio::test]
async fn client_read_outliving_its_session_is_discarded() {
    let h = harness();
    account(&h, "ana@relaydesk.io", Some("customer"));
    h.session.login("ana@relaydesk.io", &password()).await.unwrap();
    h.store.seed("clients", "c9", json!({"name": "Zoe"}));

    let pause = h.store.pause();
    let read = {
        let session = h.session.clone();
        tokio::spawn(async move { session.select_client(&ClientId::from("c9")).await })
    };
    // Let the read start and park on the paused store.
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    h.session.logout().await;
    assert_eq!(h.session.session().phase, SessionPhase::SignedOut);
    drop(pause);

    let err = read.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::NotSignedIn));
    assert!(h.session.selected_client().is_none());
    assert!(h.session.errors().latest().is_none());
}

// ── Mutations ────────────────────────────────────────────────────────

#[tokio::test]
async fn quick_note_round_trip_does_not_diverge() {
    let h = harness();
    seed_clients(&h);
    login_operator(&h).await;
    let mut clients = h.session.clients();
    clients.wait_for(|c| c.len() == 2).await.unwrap();
    let c1 = ClientId::from("c1");
    h.session.select_client(&c1).await.unwrap();

    h.session
        .mutations()
        .save_quick_note(&c1, "x")
        .await
        .unwrap();

    assert_eq!(h.session.selected_client().unwrap().quick_note, "x");
    assert_eq!(
        h.store.document("clients/c1").unwrap()["quickNote"],
        json!("x")
    );
    let snap = clients
        .wait_for(|c| c.iter().any(|r| r.id == c1 && r.quick_note == "x"))
        .await
        .unwrap();
    assert_eq!(snap.len(), 2);
    assert_eq!(h.session.selected_client().unwrap().quick_note, "x");
    assert!(h.session.errors().latest().is_none());
}

#[tokio::test]
async fn failed_quick_note_keeps_previous_value() {
    let h = harness();
    seed_clients(&h);
    login_operator(&h).await;
    h.session
        .clients()
        .wait_for(|c| c.len() == 2)
        .await
        .unwrap();
    let c1 = ClientId::from("c1");
    h.session.select_client(&c1).await.unwrap();
    h.store.fail_next(Operation::Update, "quota exceeded");

    let err = h
        .session
        .mutations()
        .save_quick_note(&c1, "x")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Mutation);
    assert_eq!(
        h.session.selected_client().unwrap().quick_note,
        "prefers email"
    );
    assert_eq!(h.session.client_sync().get("c1").unwrap().quick_note, "prefers email");
    assert_eq!(h.session.errors().latest().unwrap().kind, ErrorKind::Mutation);
}

#[tokio::test]
async fn messages_render_in_sent_at_order() {
    let h = harness();
    login_operator(&h).await;
    let t1 = "2024-05-01T10:00:00Z";
    let t2 = "2024-05-01T10:05:00Z";
    let t3 = "2024-05-01T10:10:00Z";
    let col = "chats/t1/messages";
    h.store.seed(col, "m3", json!({"text": "third", "sentAt": t3}));
    h.store.seed(col, "m1", json!({"text": "first", "sentAt": t1}));
    h.store.seed(col, "m2", json!({"text": "second", "sentAt": t2}));

    let mut feed = h.session.messages(&TopicId::from("t1")).await.unwrap();
    let snap = feed.wait_for(|m| m.len() == 3).await.unwrap();

    let texts: Vec<&str> = snap.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["first", "second", "third"]);
}

#[tokio::test]
async fn sent_message_shows_pending_then_resolves() {
    let h = harness();
    login_operator(&h).await;
    h.store
        .seed("chats", "t1", json!({"operatorId": "op", "clientId": "c1"}));
    let topic = TopicId::from("t1");
    let mut feed = h.session.messages(&topic).await.unwrap();

    let outcome = h
        .session
        .send_message(&topic, "hello there")
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.summary_updated);

    let snap = feed
        .wait_for(|m| m.len() == 1 && !m[0].sent_at.is_pending())
        .await
        .unwrap();
    assert_eq!(snap[0].id, outcome.message_id);
    assert_eq!(snap[0].sender_name, "op");
    let summary = h.store.document("chats/t1").unwrap();
    assert_eq!(summary["lastMessage"], json!("hello there"));
    assert!(summary["lastMessageAt"].is_string());
}

#[tokio::test]
async fn sent_message_is_pending_before_listener_runs() {
    let h = harness();
    login_operator(&h).await;
    h.store
        .seed("chats", "t1", json!({"operatorId": "op", "clientId": "c1"}));
    let topic = TopicId::from("t1");
    let feed = h.session.messages(&topic).await.unwrap();
    h.session.message_sync(&topic).unwrap().loaded().await.unwrap();

    let outcome = h
        .session
        .send_message(&topic, "on my way")
        .await
        .unwrap()
        .unwrap();

    // Nothing has yielded to the listener task yet.
    let now = feed.latest();
    assert_eq!(now.len(), 1);
    assert_eq!(now[0].id, outcome.message_id);
    assert_eq!(now[0].text, "on my way");
    assert!(now[0].sent_at.is_pending());
}

#[tokio::test]
async fn later_snapshot_replaces_pending_without_duplicate() {
    let h = harness();
    login_operator(&h).await;
    h.store
        .seed("chats", "t1", json!({"operatorId": "op", "clientId": "c1"}));
    let topic = TopicId::from("t1");
    let mut feed = h.session.messages(&topic).await.unwrap();
    let sync = h.session.message_sync(&topic).unwrap();
    sync.loaded().await.unwrap();
    let before = sync.subscription().await.unwrap().last_snapshot_version;

    let outcome = h
        .session
        .send_message(&topic, "on my way")
        .await
        .unwrap()
        .unwrap();
    assert!(feed.latest()[0].sent_at.is_pending());

    let snap = feed
        .wait_for(|m| m.iter().all(|msg| !msg.sent_at.is_pending()))
        .await
        .unwrap();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].id, outcome.message_id);
    assert!(sync.subscription().await.unwrap().last_snapshot_version > before);
}

#[tokio::test]
async fn blank_message_is_ignored() {
    let h = harness();
    login_operator(&h).await;
    let writes = h.store.write_count();

    let outcome = h
        .session
        .send_message(&TopicId::from("t1"), "   ")
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(h.store.write_count(), writes);
    assert!(h.session.errors().latest().is_none());
}

#[tokio::test]
async fn summary_failure_keeps_the_message() {
    let h = harness();
    login_operator(&h).await;
    h.store.seed("chats", "t1", json!({"clientId": "c1"}));
    h.store.fail_next(Operation::Update, "summary rejected");

    let outcome = h
        .session
        .send_message(&TopicId::from("t1"), "still delivered")
        .await
        .unwrap()
        .unwrap();

    assert!(!outcome.summary_updated);
    assert_eq!(h.store.collection_len("chats/t1/messages"), 1);
    assert_eq!(h.session.errors().latest().unwrap().kind, ErrorKind::Mutation);
}

#[derive(Default)]
struct RecordingDispatcher {
    requests: Mutex<Vec<CampaignRequest>>,
}

#[async_trait]
impl CampaignDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        request: CampaignRequest,
    ) -> Result<CampaignReceipt, relaydesk_api::Error> {
        let receipt = CampaignReceipt {
            campaign_id: request.id,
            recipients: request.recipients.len(),
            accepted_at: Utc::now(),
        };
        self.requests.lock().unwrap().push(request);
        Ok(receipt)
    }
}

#[tokio::test]
async fn campaign_with_no_matches_writes_nothing() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let h = with_dispatcher(dispatcher.clone());
    seed_clients(&h);
    login_operator(&h).await;
    h.session
        .clients()
        .wait_for(|c| c.len() == 2)
        .await
        .unwrap();
    let writes = h.store.write_count();

    let err = h
        .session
        .mutations()
        .send_campaign("Ghost", "Hello", "Nobody will read this")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoRecipients);
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.session.errors().published_count(), 1);
    assert!(dispatcher.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn campaign_hands_tagged_clients_to_dispatcher() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let h = with_dispatcher(dispatcher.clone());
    seed_clients(&h);
    login_operator(&h).await;
    h.session
        .clients()
        .wait_for(|c| c.len() == 2)
        .await
        .unwrap();

    let receipt = h
        .session
        .mutations()
        .send_campaign("VIP", "Sale", "20% off this week")
        .await
        .unwrap();

    assert_eq!(receipt.recipients, 1);
    let requests = dispatcher.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].recipients, vec![ClientId::from("c1")]);
    assert_eq!(requests[0].title, "Sale");
}

#[tokio::test]
async fn push_token_failure_is_only_logged() {
    let h = harness();
    let identity = login_operator(&h).await;
    let uid = UserId::from(identity.uid.as_str());

    h.store.fail_next(Operation::Update, "offline");
    h.session
        .mutations()
        .register_push_token(&uid, "tok-1")
        .await
        .unwrap();
    assert!(h.session.errors().latest().is_none());

    h.session
        .mutations()
        .register_push_token(&uid, "tok-2")
        .await
        .unwrap();
    let profile = h.store.document(&format!("users/{}", identity.uid)).unwrap();
    assert_eq!(profile["pushToken"], Value::from("tok-2"));
}
