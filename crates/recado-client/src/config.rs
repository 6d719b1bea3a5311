//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so a client starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use recado_shared::constants::{NOTICE_POLL_SECS, PRESENCE_EXPIRY_SECS, PRESENCE_HEARTBEAT_SECS};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Database file backing the local message store.
    /// Env: `RECADO_DB_PATH`
    /// Default: `None` (platform data directory).
    pub db_path: Option<PathBuf>,

    /// Interval between presence announcements.
    /// Env: `RECADO_PRESENCE_HEARTBEAT_SECS`
    /// Default: `15`
    pub presence_heartbeat: Duration,

    /// Members not refreshed within this window are considered gone.
    /// Env: `RECADO_PRESENCE_EXPIRY_SECS`
    /// Default: `45`
    pub presence_expiry: Duration,

    /// Interval between system notice refreshes.
    /// Env: `RECADO_NOTICE_POLL_SECS`
    /// Default: `10`
    pub notice_poll: Duration,

    /// Buffer size of the [`crate::MessengerEvent`] broadcast channel.
    /// Env: `RECADO_EVENT_CAPACITY`
    /// Default: `64`
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            presence_heartbeat: Duration::from_secs(PRESENCE_HEARTBEAT_SECS),
            presence_expiry: Duration::from_secs(PRESENCE_EXPIRY_SECS),
            notice_poll: Duration::from_secs(NOTICE_POLL_SECS),
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("RECADO_DB_PATH") {
            if !path.trim().is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(secs) = parse_secs(&lookup, "RECADO_PRESENCE_HEARTBEAT_SECS") {
            config.presence_heartbeat = secs;
        }

        if let Some(secs) = parse_secs(&lookup, "RECADO_PRESENCE_EXPIRY_SECS") {
            config.presence_expiry = secs;
        }

        if let Some(secs) = parse_secs(&lookup, "RECADO_NOTICE_POLL_SECS") {
            config.notice_poll = secs;
        }

        if let Some(raw) = lookup("RECADO_EVENT_CAPACITY") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.event_capacity = n,
                _ => {
                    tracing::warn!(value = %raw, "Invalid RECADO_EVENT_CAPACITY, using default");
                }
            }
        }

        if config.presence_expiry <= config.presence_heartbeat {
            tracing::warn!(
                heartbeat = ?config.presence_heartbeat,
                expiry = ?config.presence_expiry,
                "Presence expiry does not exceed the heartbeat; members may flap"
            );
        }

        config
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid duration, using default");
            None
        }
    }
}
