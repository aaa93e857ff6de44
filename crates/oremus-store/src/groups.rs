//! Group records: creation, discovery listing, pinning, deletion.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use oremus_shared::{CursorKey, Group, GroupId, MembershipType, PrayerId, Reminder, UserId};

use crate::database::{from_millis, ts_millis, Database};
use crate::error::{Result, StoreError};
use crate::query::{Dir, Predicate, SelectSpec};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a group together with its optional reminder and the admin's
    /// accepted, moderator membership, in one transaction.
    pub fn create_group(&mut self, group: &Group, reminder: Option<&Reminder>) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        if let Some(reminder) = reminder {
            tx.execute(
                "INSERT INTO reminders (id, time, days, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    reminder.id.to_string(),
                    reminder.time,
                    reminder.days,
                    ts_millis(reminder.created_at),
                ],
            )?;
        }

        tx.execute(
            "INSERT INTO groups (id, name, description, membership_type, admin_id, banner_image, reminder_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                group.id.to_string(),
                group.name,
                group.description,
                group.membership_type.as_str(),
                group.admin_id.to_string(),
                group.banner_image,
                group.reminder_id.map(|r| r.to_string()),
                ts_millis(group.created_at),
            ],
        )?;

        // The admin is an accepted moderator member from the start.
        let now = ts_millis(group.created_at);
        tx.execute(
            "INSERT INTO memberships (group_id, user_id, requested_at, accepted_at, moderator_since)
             VALUES (?1, ?2, ?3, ?3, ?3)",
            params![group.id.to_string(), group.admin_id.to_string(), now],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single group by id.
    pub fn get_group(&self, id: GroupId) -> Result<Group> {
        self.conn()
            .query_row(
                "SELECT id, name, description, membership_type, admin_id, banner_image, reminder_id, created_at
                 FROM groups WHERE id = ?1",
                params![id.to_string()],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Discovery listing: newest group first, id tiebreak.  Private groups
    /// are hidden unless the viewer is an accepted member.  `search` is a
    /// case-insensitive substring match over name and description;
    /// `member_of` restricts to groups the given user belongs to.
    pub fn list_groups(
        &self,
        viewer: Option<UserId>,
        search: Option<&str>,
        member_of: Option<UserId>,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(Group, CursorKey)>> {
        let base = "SELECT g.id, g.name, g.description, g.membership_type, g.admin_id, \
                    g.banner_image, g.reminder_id, g.created_at FROM groups g";

        let privacy = match viewer {
            Some(v) => Predicate::new(
                "(g.membership_type <> 'private' OR EXISTS (\
                 SELECT 1 FROM memberships m WHERE m.group_id = g.id \
                 AND m.user_id = ? AND m.accepted_at IS NOT NULL))",
                vec![v.to_string().into()],
            ),
            None => Predicate::new("g.membership_type <> 'private'", vec![]),
        };

        let search_pred = search.filter(|q| !q.is_empty()).map(|q| {
            let needle = format!("%{q}%");
            Predicate::new(
                "(g.name LIKE ? OR g.description LIKE ?)",
                vec![needle.clone().into(), needle.into()],
            )
        });

        let member_pred = member_of.map(|u| {
            Predicate::new(
                "EXISTS (SELECT 1 FROM memberships m2 WHERE m2.group_id = g.id \
                 AND m2.user_id = ? AND m2.accepted_at IS NOT NULL)",
                vec![u.to_string().into()],
            )
        });

        let keyset =
            cursor.map(|key| Predicate::keyset(&[("g.created_at", Dir::Desc), ("g.id", Dir::Asc)], key));

        let spec = SelectSpec::new(
            base,
            vec![("g.created_at".to_string(), Dir::Desc), ("g.id".to_string(), Dir::Asc)],
            limit,
        )
        .and(privacy)
        .and_opt(search_pred)
        .and_opt(member_pred)
        .and_opt(keyset);

        let mut stmt = self.conn().prepare(&spec.sql())?;
        let rows = stmt.query_map(rusqlite::params_from_iter(spec.params()), row_to_group)?;

        let mut out = Vec::new();
        for row in rows {
            let group = row?;
            let key = CursorKey::new(vec![ts_millis(group.created_at)], group.id.to_string());
            out.push((group, key));
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the admin-mutable fields.  `admin_id` never changes.
    pub fn update_group(&self, group: &Group) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE groups SET name = ?2, description = ?3, membership_type = ?4,
             banner_image = ?5, reminder_id = ?6
             WHERE id = ?1",
            params![
                group.id.to_string(),
                group.name,
                group.description,
                group.membership_type.as_str(),
                group.banner_image,
                group.reminder_id.map(|r| r.to_string()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pinning
    // ------------------------------------------------------------------

    /// Pin a prayer in its group.  At most one prayer is pinned per group;
    /// pinning another replaces it.
    pub fn set_pinned_prayer(
        &self,
        group_id: GroupId,
        prayer_id: PrayerId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO pinned_prayers (group_id, prayer_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (group_id) DO UPDATE SET
                 prayer_id = excluded.prayer_id, created_at = excluded.created_at",
            params![group_id.to_string(), prayer_id.to_string(), ts_millis(now)],
        )?;
        Ok(())
    }

    /// Unpin whatever is pinned.  Returns `true` if something was pinned.
    pub fn clear_pinned_prayer(&self, group_id: GroupId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM pinned_prayers WHERE group_id = ?1",
            params![group_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    pub fn get_pinned_prayer(&self, group_id: GroupId) -> Result<Option<PrayerId>> {
        let id: Option<String> = self
            .conn()
            .query_row(
                "SELECT prayer_id FROM pinned_prayers WHERE group_id = ?1",
                params![group_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|s| PrayerId::parse(&s)).transpose().map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a group and cascade its membership state.
    ///
    /// Refused with [`StoreError::GroupNotEmpty`] while any prayer or
    /// corporate campaign still references the group.  The check and the
    /// deletion run under an immediate transaction so a concurrent prayer
    /// insert cannot slip between them.
    pub fn delete_group(&mut self, group_id: GroupId) -> Result<()> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let gid = group_id.to_string();

        let reminder_id: Option<String> = tx
            .query_row(
                "SELECT reminder_id FROM groups WHERE id = ?1",
                params![gid],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        let prayers: i64 = tx.query_row(
            "SELECT COUNT(*) FROM prayers WHERE group_id = ?1",
            params![gid],
            |row| row.get(0),
        )?;
        let campaigns: i64 = tx.query_row(
            "SELECT COUNT(*) FROM corporate_prayers WHERE group_id = ?1",
            params![gid],
            |row| row.get(0),
        )?;
        if prayers > 0 || campaigns > 0 {
            return Err(StoreError::GroupNotEmpty);
        }

        tx.execute("DELETE FROM pinned_prayers WHERE group_id = ?1", params![gid])?;
        tx.execute("DELETE FROM invitations WHERE group_id = ?1", params![gid])?;
        tx.execute("DELETE FROM member_bans WHERE group_id = ?1", params![gid])?;
        tx.execute("DELETE FROM memberships WHERE group_id = ?1", params![gid])?;
        tx.execute("DELETE FROM group_bans WHERE group_id = ?1", params![gid])?;
        tx.execute("DELETE FROM groups WHERE id = ?1", params![gid])?;
        if let Some(reminder_id) = reminder_id {
            tx.execute("DELETE FROM reminders WHERE id = ?1", params![reminder_id])?;
        }

        tx.commit()?;
        tracing::info!(group_id = %group_id, "deleted group");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Group`].
pub(crate) fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id_str: String = row.get(0)?;
    let ty_str: String = row.get(3)?;
    let admin_str: String = row.get(4)?;
    let reminder_str: Option<String> = row.get(6)?;

    let id = GroupId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let membership_type = MembershipType::from_str(&ty_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown membership type: {ty_str}").into(),
        )
    })?;
    let admin_id = UserId::parse(&admin_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let reminder_id = reminder_str
        .map(|s| oremus_shared::ReminderId::parse(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Group {
        id,
        name: row.get(1)?,
        description: row.get(2)?,
        membership_type,
        admin_id,
        banner_image: row.get(5)?,
        reminder_id,
        created_at: from_millis(row.get(7)?)?,
    })
}
