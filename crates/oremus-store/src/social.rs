//! Follow and block edges.

use chrono::{DateTime, Utc};
use rusqlite::params;

use oremus_shared::UserId;

use crate::database::{ts_millis, Database};
use crate::error::Result;

impl Database {
    // ------------------------------------------------------------------
    // Follows
    // ------------------------------------------------------------------

    /// Record a follow edge.  Idempotent: re-following is a no-op.
    pub fn follow(&self, follower: UserId, following: UserId, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO user_follows (follower_id, following_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![follower.to_string(), following.to_string(), ts_millis(now)],
        )?;
        Ok(())
    }

    /// Remove a follow edge.  Returns `true` if an edge was removed.
    pub fn unfollow(&self, follower: UserId, following: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM user_follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower.to_string(), following.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn is_following(&self, follower: UserId, following: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM user_follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower.to_string(), following.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn follower_count(&self, user: UserId) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM user_follows WHERE following_id = ?1",
            params![user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn following_count(&self, user: UserId) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM user_follows WHERE follower_id = ?1",
            params![user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Record a block edge.  Idempotent.
    pub fn block(&self, user: UserId, target: UserId, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO user_blocks (user_id, target_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![user.to_string(), target.to_string(), ts_millis(now)],
        )?;
        Ok(())
    }

    /// Remove a block edge.  Returns `true` if an edge was removed.
    pub fn unblock(&self, user: UserId, target: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM user_blocks WHERE user_id = ?1 AND target_id = ?2",
            params![user.to_string(), target.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Whether a block edge exists in either direction between two users.
    pub fn is_blocked_between(&self, a: UserId, b: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM user_blocks
             WHERE (user_id = ?1 AND target_id = ?2) OR (user_id = ?2 AND target_id = ?1)",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
