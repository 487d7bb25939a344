// ── Store layout ──
//
// Where each record type lives in the document store.

use relaydesk_api::{CollectionPath, DocumentPath, Error};

use crate::model::{ClientId, TopicId, UserId};

pub const USERS: &str = "users";
pub const CLIENTS: &str = "clients";
pub const CHATS: &str = "chats";
pub const MESSAGES: &str = "messages";

pub fn user(uid: &UserId) -> Result<DocumentPath, Error> {
    DocumentPath::new(format!("{USERS}/{uid}"))
}

pub fn clients() -> Result<CollectionPath, Error> {
    CollectionPath::new(CLIENTS)
}

pub fn client(id: &ClientId) -> Result<DocumentPath, Error> {
    DocumentPath::new(format!("{CLIENTS}/{id}"))
}

pub fn topic(id: &TopicId) -> Result<DocumentPath, Error> {
    DocumentPath::new(format!("{CHATS}/{id}"))
}

pub fn messages(id: &TopicId) -> Result<CollectionPath, Error> {
    topic(id)?.collection(MESSAGES)
}
