//! Ban records: per-member, whole-group, and platform-level user bans.

use chrono::{DateTime, Utc};
use rusqlite::params;

use oremus_shared::{GroupId, UserId};

use crate::database::{ts_millis, Database};
use crate::error::Result;

impl Database {
    // ------------------------------------------------------------------
    // Member bans (group-scoped)
    // ------------------------------------------------------------------

    /// Ban or unban a user from a group.  Both directions are idempotent.
    pub fn set_member_ban(
        &self,
        group_id: GroupId,
        user_id: UserId,
        on: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if on {
            self.conn().execute(
                "INSERT OR IGNORE INTO member_bans (group_id, user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![group_id.to_string(), user_id.to_string(), ts_millis(now)],
            )?;
        } else {
            self.conn().execute(
                "DELETE FROM member_bans WHERE group_id = ?1 AND user_id = ?2",
                params![group_id.to_string(), user_id.to_string()],
            )?;
        }
        Ok(())
    }

    pub fn is_member_banned(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM member_bans WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ------------------------------------------------------------------
    // Group bans (platform sanction)
    // ------------------------------------------------------------------

    pub fn set_group_ban(&self, group_id: GroupId, on: bool, now: DateTime<Utc>) -> Result<()> {
        if on {
            self.conn().execute(
                "INSERT OR IGNORE INTO group_bans (group_id, created_at) VALUES (?1, ?2)",
                params![group_id.to_string(), ts_millis(now)],
            )?;
        } else {
            self.conn().execute(
                "DELETE FROM group_bans WHERE group_id = ?1",
                params![group_id.to_string()],
            )?;
        }
        Ok(())
    }

    pub fn is_group_banned(&self, group_id: GroupId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM group_bans WHERE group_id = ?1",
            params![group_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ------------------------------------------------------------------
    // User bans (platform level)
    // ------------------------------------------------------------------

    pub fn set_user_ban(&self, user_id: UserId, on: bool, now: DateTime<Utc>) -> Result<()> {
        if on {
            self.conn().execute(
                "INSERT OR IGNORE INTO user_bans (user_id, created_at) VALUES (?1, ?2)",
                params![user_id.to_string(), ts_millis(now)],
            )?;
        } else {
            self.conn().execute(
                "DELETE FROM user_bans WHERE user_id = ?1",
                params![user_id.to_string()],
            )?;
        }
        Ok(())
    }

    pub fn is_user_banned(&self, user_id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM user_bans WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
