use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

// Staff member identity, assigned by the directory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of a message.
///
/// Durable ids come from the message store. Provisional ids are handed out
/// by the local send queue while a write is in flight. The two live in
/// separate variants, so a provisional id can never equal a durable one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageId {
    Durable(Uuid),
    Provisional(u64),
}

impl MessageId {
    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }

    pub fn as_durable(&self) -> Option<Uuid> {
        match self {
            MessageId::Durable(id) => Some(*id),
            MessageId::Provisional(_) => None,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageId::Durable(id) => write!(f, "{id}"),
            MessageId::Provisional(seq) => write!(f, "local-{seq}"),
        }
    }
}

impl FromStr for MessageId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(seq) = s.strip_prefix("local-") {
            return seq
                .parse()
                .map(MessageId::Provisional)
                .map_err(|_| ProtocolError::InvalidMessageId(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(MessageId::Durable)
            .map_err(|_| ProtocolError::InvalidMessageId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Receptionist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Receptionist => "receptionist",
        }
    }

    /// Label shown under the peer's name in the contact list.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Doctor => "Doctor",
            Role::Receptionist => "Receptionist",
        }
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "receptionist" => Ok(Role::Receptionist),
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }
}

/// Another staff member addressable for direct messaging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
}

/// A direct message between exactly one sender and one receiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub urgent: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether `{sender, receiver}` is a permutation of `{a, b}`.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (self.sender_id == *a && self.receiver_id == *b)
            || (self.sender_id == *b && self.receiver_id == *a)
    }
}
