/// Application name
pub const APP_NAME: &str = "Recado";

/// Presence channel every connected client joins
pub const PRESENCE_CHANNEL: &str = "online_users";

/// Maximum number of messages returned by one conversation fetch
pub const CONVERSATION_PAGE_LIMIT: u32 = 100;

/// Maximum message length in characters
pub const MAX_MESSAGE_CHARS: usize = 4_000;

/// Interval between presence announcements, in seconds
pub const PRESENCE_HEARTBEAT_SECS: u64 = 15;

/// A presence member not refreshed within this window is dropped, in seconds
pub const PRESENCE_EXPIRY_SECS: u64 = 45;

/// Interval between system notice refreshes, in seconds
pub const NOTICE_POLL_SECS: u64 = 10;

/// Capacity of the store change feed broadcast buffer
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// Title of the blocking urgent-message dialog
pub const URGENT_ALERT_TITLE: &str = "IMPORTANT NOTICE";

/// Display name used when the sender is not in the roster
pub const UNKNOWN_SENDER_NAME: &str = "Unknown user";
