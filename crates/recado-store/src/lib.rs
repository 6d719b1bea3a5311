//! # recado-store
//!
//! Message store for Recado, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle with typed CRUD
//! helpers, a [`ChangeFeed`] that pushes row-level changes to subscribers,
//! and the async service traits ([`MessageStore`], [`Directory`],
//! [`NoticeBoard`]) the client talks to. [`LocalService`] implements all
//! three on top of a local database.

pub mod database;
pub mod feed;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notices;
pub mod service;
pub mod users;

mod error;

pub use database::Database;
pub use error::{FeedError, Result, StoreError};
pub use feed::{ChangeFeed, ChangeSubscription};
pub use models::*;
pub use service::{Directory, LocalService, MessageStore, NoticeBoard};
