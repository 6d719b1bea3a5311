use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed presence payload: {0}")]
    MalformedPresence(#[from] serde_json::Error),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),
}
