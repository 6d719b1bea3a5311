use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Message, MessageId, UserId};

/// Row-level change pushed by the message store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted(Message),
    Updated(Message),
    /// Deletes carry only the primary key of the removed row.
    Deleted { id: MessageId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Inserted(_) => ChangeKind::Insert,
            ChangeEvent::Updated(_) => ChangeKind::Update,
            ChangeEvent::Deleted { .. } => ChangeKind::Delete,
        }
    }

    pub fn row(&self) -> Option<&Message> {
        match self {
            ChangeEvent::Inserted(row) | ChangeEvent::Updated(row) => Some(row),
            ChangeEvent::Deleted { .. } => None,
        }
    }
}

/// Server-side filter applied to a change feed subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilter {
    /// Inserts whose receiver is the given user.
    InsertsTo(UserId),
    /// Inserts and updates between the two users, plus every delete.
    ///
    /// A delete has no row content to match against, so it cannot be
    /// scoped here; subscribers decide whether the id concerns them.
    Conversation(UserId, UserId),
}

impl ChangeFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            ChangeFilter::InsertsTo(me) => {
                matches!(event, ChangeEvent::Inserted(row) if row.receiver_id == *me)
            }
            ChangeFilter::Conversation(a, b) => event.row().map_or(true, |row| row.is_between(a, b)),
        }
    }
}

/// An inbound message as seen by the inbox.
///
/// Urgent messages get their own variant so the "always alert" rule is a
/// match arm rather than a flag check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Ordinary(Message),
    Urgent(Message),
}

impl InboundEvent {
    pub fn message(&self) -> &Message {
        match self {
            InboundEvent::Ordinary(m) | InboundEvent::Urgent(m) => m,
        }
    }

    pub fn sender(&self) -> UserId {
        self.message().sender_id
    }
}

impl From<Message> for InboundEvent {
    fn from(message: Message) -> Self {
        if message.urgent {
            InboundEvent::Urgent(message)
        } else {
            InboundEvent::Ordinary(message)
        }
    }
}

/// State a client announces on the presence channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PresencePayload {
    pub user_id: UserId,
    pub online_at: DateTime<Utc>,
}

impl PresencePayload {
    pub fn now(user_id: UserId) -> Self {
        Self {
            user_id,
            online_at: Utc::now(),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "user_id": self.user_id,
            "online_at": self.online_at,
        })
    }

    /// Validate a raw payload received from the channel.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ProtocolError> {
        Ok(Self::deserialize(value)?)
    }
}
