//! Domain model structs persisted in the local database.
//!
//! Messages and peers are the shared types from `recado-shared`; the
//! structs here are the store-only shapes around them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recado_shared::{Peer, Role, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A directory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Human-readable display name.
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for Peer {
    fn from(u: UserRecord) -> Self {
        Peer {
            id: u.id,
            display_name: u.name,
            role: u.role,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Insert payload for a message. The store assigns the id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub urgent: bool,
}

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// A system notice addressed to one user (e.g. a newly booked appointment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub id: Uuid,
    pub user_id: UserId,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
