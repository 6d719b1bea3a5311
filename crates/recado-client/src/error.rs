use thiserror::Error;

use recado_realtime::PresenceError;
use recado_shared::UserId;
use recado_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Presence error: {0}")]
    Presence(#[from] PresenceError),

    #[error("No conversation is open")]
    NoOpenConversation,

    #[error("Unknown peer: {0}")]
    UnknownPeer(UserId),

    #[error("Message is empty")]
    EmptyMessage,
}

impl ClientError {
    /// Whether the store refused the write, as opposed to failing to reach it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Store(e) if e.is_rejection())
    }
}
