//! v001 -- Initial schema creation.
//!
//! Creates the three tables the messaging subsystem needs: `users`,
//! `messages` and `notices`.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (directory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    username   TEXT UNIQUE NOT NULL,
    name       TEXT NOT NULL,
    role       TEXT NOT NULL CHECK (role IN ('admin', 'doctor', 'receptionist')),
    created_at TEXT NOT NULL                  -- RFC-3339, microseconds, UTC
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    sender_id   TEXT NOT NULL,                -- FK -> users(id)
    receiver_id TEXT NOT NULL,                -- FK -> users(id)
    content     TEXT NOT NULL CHECK (length(trim(content)) > 0),
    is_urgent   INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    created_at  TEXT NOT NULL,

    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);

-- ----------------------------------------------------------------
-- Notices (system notifications addressed to one user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notices (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user_id    TEXT NOT NULL,                 -- FK -> users(id)
    content    TEXT NOT NULL,
    read       INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_notices_user_read
    ON notices(user_id, read);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
