use chrono::{SubsecRound, Utc};
use rusqlite::params;
use uuid::Uuid;

use recado_shared::constants::MAX_MESSAGE_CHARS;
use recado_shared::{Message, MessageId, UserId};

use crate::database::{decode_ts, decode_uuid, encode_ts, reject_constraints, Database};
use crate::error::{Result, StoreError};
use crate::models::NewMessage;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, is_urgent, created_at";

impl Database {
    /// Persist a message, assigning its durable id and timestamp.
    pub fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        if new.content.trim().is_empty() {
            return Err(StoreError::Rejected("message content is empty".into()));
        }
        if new.content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(StoreError::Rejected(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let message = Message {
            id: MessageId::Durable(Uuid::new_v4()),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content.clone(),
            urgent: new.urgent,
            created_at: Utc::now().trunc_subsecs(6),
        };

        self.conn()
            .execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, is_urgent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    message.receiver_id.to_string(),
                    message.content,
                    message.urgent,
                    encode_ts(&message.created_at),
                ],
            )
            .map_err(reject_constraints)?;

        Ok(message)
    }

    /// The most recent `limit` messages between `a` and `b`, oldest first.
    pub fn list_conversation(&self, a: UserId, b: UserId, limit: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                 SELECT rowid AS seq, {MESSAGE_COLUMNS}
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, seq DESC
                 LIMIT ?3
             )
             ORDER BY created_at ASC, seq ASC"
        ))?;

        let rows = stmt.query_map(
            params![a.to_string(), b.to_string(), limit],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Returns whether a row was removed.
    pub fn delete_message(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: String = row.get(2)?;
    let ts_str: String = row.get(5)?;

    Ok(Message {
        id: MessageId::Durable(decode_uuid(0, &id_str)?),
        sender_id: UserId(decode_uuid(1, &sender_str)?),
        receiver_id: UserId(decode_uuid(2, &receiver_str)?),
        content: row.get(3)?,
        urgent: row.get(4)?,
        created_at: decode_ts(5, &ts_str)?,
    })
}
