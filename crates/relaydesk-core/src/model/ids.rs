// ── Identifier newtypes ──
//
// Store-assigned document ids, typed per collection so a client id can
// never be passed where a topic id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

document_id! {
    /// Auth identity uid; also the id of the `users/{uid}` profile document.
    UserId
}

document_id! {
    /// Id of a `clients/{id}` customer record.
    ClientId
}

document_id! {
    /// Id of a `chats/{id}` conversation.
    TopicId
}

document_id! {
    /// Id of a message inside `chats/{topic}/messages`.
    MessageId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = ClientId::from("c-1");
        assert_eq!(serde_json::to_string(&id).ok().as_deref(), Some("\"c-1\""));
        assert_eq!(id.to_string(), "c-1");
    }
}
