//! Types shared by every Recado crate: peers, messages, change events and
//! the presence payload exchanged on the realtime channel.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{ChangeEvent, ChangeFilter, ChangeKind, InboundEvent, PresencePayload};
pub use types::{Message, MessageId, Peer, Role, UserId};
