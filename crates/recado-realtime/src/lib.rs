//! Realtime presence transport: named channels whose members are dropped
//! when they stop sending heartbeats.

pub mod error;
pub mod presence;

pub use error::PresenceError;
pub use presence::{
    spawn_presence_hub, ChannelHandle, ConnectionId, HubCommand, PresenceChannel, PresenceConfig,
    PresenceHubHandle, PresenceSnapshot, SyncStream,
};
