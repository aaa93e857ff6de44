//! Moderator-issued invitations.
//!
//! An invitation's presence auto-accepts the invitee's next join
//! (consumed inside the `upsert_join` transaction in `memberships.rs`).

use chrono::{DateTime, Utc};
use rusqlite::params;

use oremus_shared::{GroupId, Invitation, UserId};

use crate::database::{from_millis, ts_millis, Database};
use crate::error::Result;

impl Database {
    /// Create an invitation.  Idempotent: re-inviting is a no-op.
    pub fn create_invitation(
        &self,
        group_id: GroupId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO invitations (group_id, user_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![group_id.to_string(), user_id.to_string(), ts_millis(now)],
        )?;
        Ok(())
    }

    /// Revoke (or decline) an invitation.  Returns `true` if one existed.
    pub fn delete_invitation(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM invitations WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn get_invitation(&self, group_id: GroupId, user_id: UserId) -> Result<Option<Invitation>> {
        let mut stmt = self.conn().prepare(
            "SELECT group_id, user_id, created_at FROM invitations
             WHERE group_id = ?1 AND user_id = ?2",
        )?;
        let mut rows = stmt.query_map(
            params![group_id.to_string(), user_id.to_string()],
            row_to_invitation,
        )?;
        rows.next().transpose().map_err(Into::into)
    }

    /// All open invitations for one user, newest first.
    pub fn list_invitations_for_user(&self, user_id: UserId) -> Result<Vec<Invitation>> {
        let mut stmt = self.conn().prepare(
            "SELECT group_id, user_id, created_at FROM invitations
             WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_invitation)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn row_to_invitation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invitation> {
    let group_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let group_id = GroupId::parse(&group_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let user_id = UserId::parse(&user_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Invitation {
        group_id,
        user_id,
        created_at: from_millis(row.get(2)?)?,
    })
}
