//! CRUD operations for [`UserRecord`] records.

use chrono::{SubsecRound, Utc};
use rusqlite::params;

use recado_shared::{Role, UserId};

use crate::database::{decode_ts, decode_uuid, encode_ts, reject_constraints, Database};
use crate::error::Result;
use crate::models::UserRecord;

const USER_COLUMNS: &str = "id, username, name, role, created_at";

impl Database {
    /// Register a new directory entry.
    pub fn create_user(&self, username: &str, name: &str, role: Role) -> Result<UserRecord> {
        let user = UserRecord {
            id: UserId::new(),
            username: username.to_string(),
            name: name.to_string(),
            role,
            created_at: Utc::now().trunc_subsecs(6),
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, username, name, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.name,
                    user.role.as_str(),
                    encode_ts(&user.created_at),
                ],
            )
            .map_err(reject_constraints)?;

        Ok(user)
    }

    /// List every user except `exclude`, ordered by display name.
    pub fn list_users_except(&self, exclude: UserId) -> Result<Vec<UserRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY name COLLATE NOCASE"
        ))?;

        let rows = stmt.query_map(params![exclude.to_string()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(3)?;
    let ts_str: String = row.get(4)?;

    let role = role_str.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(UserRecord {
        id: UserId(decode_uuid(0, &id_str)?),
        username: row.get(1)?,
        name: row.get(2)?,
        role,
        created_at: decode_ts(4, &ts_str)?,
    })
}
