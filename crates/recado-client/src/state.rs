//! State shared by the messenger's components.
//!
//! [`ChatState`] sits behind one `Arc<Mutex<>>`. The open conversation and
//! the unread counters live under the same lock, so deciding "is this
//! sender's conversation open?" and bumping its counter cannot interleave
//! with opening that conversation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use recado_shared::constants::UNKNOWN_SENDER_NAME;
use recado_shared::{Peer, UserId};
use recado_store::Notice;

use crate::conversation::Conversation;
use crate::unread::UnreadCounters;

#[derive(Debug, Default)]
pub struct ChatState {
    /// Peers from the directory, ordered by display name.
    pub roster: Vec<Peer>,

    pub unread: UnreadCounters,

    pub conversation: Conversation,

    /// Unread system notices, newest first.
    pub notices: Vec<Notice>,
}

impl ChatState {
    pub fn peer(&self, id: &UserId) -> Option<&Peer> {
        self.roster.iter().find(|p| p.id == *id)
    }

    pub fn display_name(&self, id: &UserId) -> String {
        self.peer(id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| UNKNOWN_SENDER_NAME.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<Mutex<ChatState>>);

impl SharedState {
    /// Lock the state. A panic in another holder does not leave the counters
    /// half-written, so a poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recado_shared::Role;

    #[test]
    fn test_display_name_falls_back() {
        let state = SharedState::default();
        let known = Peer {
            id: UserId::new(),
            display_name: "Dr. Ana".into(),
            role: Role::Doctor,
        };
        state.lock().roster.push(known.clone());

        let guard = state.lock();
        assert_eq!(guard.display_name(&known.id), "Dr. Ana");
        assert_eq!(guard.display_name(&UserId::new()), UNKNOWN_SENDER_NAME);
    }
}
