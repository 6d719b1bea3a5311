use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The store refused a write (validation or constraint failure).
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// The database mutex was poisoned by a panicking writer.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Stored value failed domain validation.
    #[error("Protocol error: {0}")]
    Protocol(#[from] recado_shared::ProtocolError),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    /// Whether this error is a permission/validation refusal, as opposed to
    /// a transient or internal failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, StoreError::Rejected(_))
    }
}

/// Errors produced while reading a change feed subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The subscriber fell behind and `0` events were dropped.
    #[error("Subscription lagged, {0} events skipped")]
    Lagged(u64),

    /// The feed was dropped.
    #[error("Change feed closed")]
    Closed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
