// ── Session state machine ──
//
// SignedOut → Authenticating → ProfileResolving → Ready(role), with
// Error reachable from the two in-flight phases and leading back to
// SignedOut. `Session::next` is the only way to move between states,
// and it cannot produce `Ready` without a resolved profile.

use relaydesk_api::Identity;
use strum::IntoStaticStr;

use crate::error::ErrorKind;
use crate::model::{Profile, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    SignedOut,
    Authenticating,
    ProfileResolving,
    Ready(Role),
    Error(ErrorKind),
}

/// The observable session. Exactly one per [`SessionController`](super::SessionController).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub phase: SessionPhase,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SessionEvent {
    /// Credentials accepted locally, sign-in starting.
    Begin,
    /// The auth service accepted the credentials.
    SignedIn(Identity),
    /// A persisted identity was found at startup.
    Restored(Identity),
    ProfileResolved(Profile),
    Failed(ErrorKind),
    Reset,
}

impl Default for Session {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl Session {
    pub fn signed_out() -> Self {
        Self {
            identity: None,
            profile: None,
            phase: SessionPhase::SignedOut,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, SessionPhase::Ready(_))
    }

    /// The role, once the session is ready.
    pub fn role(&self) -> Option<Role> {
        match self.phase {
            SessionPhase::Ready(role) => Some(role),
            _ => None,
        }
    }

    /// Apply `event`, returning the next state, or `None` if the event is
    /// not valid in the current phase.
    pub(crate) fn next(&self, event: SessionEvent) -> Option<Self> {
        use SessionPhase as P;

        match (self.phase, event) {
            (P::SignedOut, SessionEvent::Begin) => Some(Self {
                phase: P::Authenticating,
                ..Self::signed_out()
            }),
            (P::Authenticating, SessionEvent::SignedIn(identity))
            | (P::SignedOut, SessionEvent::Restored(identity)) => Some(Self {
                identity: Some(identity),
                profile: None,
                phase: P::ProfileResolving,
            }),
            (P::ProfileResolving, SessionEvent::ProfileResolved(profile)) => {
                let identity = self.identity.as_ref()?;
                if profile.id.as_str() != identity.uid {
                    return None;
                }
                Some(Self {
                    identity: Some(identity.clone()),
                    phase: P::Ready(profile.role),
                    profile: Some(profile),
                })
            }
            (P::Authenticating | P::ProfileResolving, SessionEvent::Failed(kind)) => Some(Self {
                identity: None,
                profile: None,
                phase: P::Error(kind),
            }),
            (_, SessionEvent::Reset) => Some(Self::signed_out()),
            _ => None,
        }
    }
}
