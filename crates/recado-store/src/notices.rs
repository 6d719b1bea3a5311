//! CRUD operations for [`Notice`] records.

use chrono::{SubsecRound, Utc};
use rusqlite::params;
use uuid::Uuid;

use recado_shared::UserId;

use crate::database::{decode_ts, decode_uuid, encode_ts, reject_constraints, Database};
use crate::error::{Result, StoreError};
use crate::models::Notice;

impl Database {
    pub fn insert_notice(&self, user_id: UserId, content: &str) -> Result<Notice> {
        let notice = Notice {
            id: Uuid::new_v4(),
            user_id,
            content: content.to_string(),
            read: false,
            created_at: Utc::now().trunc_subsecs(6),
        };

        self.conn()
            .execute(
                "INSERT INTO notices (id, user_id, content, read, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![
                    notice.id.to_string(),
                    notice.user_id.to_string(),
                    notice.content,
                    encode_ts(&notice.created_at),
                ],
            )
            .map_err(reject_constraints)?;

        Ok(notice)
    }

    /// Unread notices for `user_id`, newest first.
    pub fn list_unread_notices(&self, user_id: UserId) -> Result<Vec<Notice>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, content, read, created_at
             FROM notices
             WHERE user_id = ?1 AND read = 0
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_notice)?;

        let mut notices = Vec::new();
        for row in rows {
            notices.push(row?);
        }
        Ok(notices)
    }

    pub fn mark_notice_read(&self, id: Uuid) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE notices SET read = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Returns how many notices were flipped to read.
    pub fn mark_all_notices_read(&self, user_id: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE notices SET read = 1 WHERE user_id = ?1 AND read = 0",
            params![user_id.to_string()],
        )?;
        Ok(affected)
    }
}

fn row_to_notice(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notice> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let ts_str: String = row.get(4)?;

    Ok(Notice {
        id: decode_uuid(0, &id_str)?,
        user_id: UserId(decode_uuid(1, &user_str)?),
        content: row.get(2)?,
        read: row.get(3)?,
        created_at: decode_ts(4, &ts_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use recado_shared::Role;

    #[test]
    fn test_unread_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let doc = db.create_user("doc", "Dr. House", Role::Doctor).unwrap().id;
        let other = db.create_user("rec", "Rita", Role::Receptionist).unwrap().id;

        let first = db.insert_notice(doc, "New appointment: 2024-03-01 09:00").unwrap();
        db.insert_notice(doc, "New appointment: 2024-03-01 10:00").unwrap();
        db.insert_notice(other, "not yours").unwrap();

        assert_eq!(db.list_unread_notices(doc).unwrap().len(), 2);

        db.mark_notice_read(first.id).unwrap();
        let remaining = db.list_unread_notices(doc).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, first.id);

        assert_eq!(db.mark_all_notices_read(doc).unwrap(), 1);
        assert!(db.list_unread_notices(doc).unwrap().is_empty());
        assert_eq!(db.list_unread_notices(other).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_unknown_notice() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.mark_notice_read(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }
}
