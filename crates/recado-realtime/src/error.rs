use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    #[error("Presence hub is not running")]
    HubClosed,

    #[error("Presence hub dropped the join request for channel {0}")]
    JoinDropped(String),
}
