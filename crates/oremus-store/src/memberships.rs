//! Membership state: join/accept/moderator transitions and member listing.
//!
//! `upsert_join` is the concurrency-sensitive operation: the auto-accept
//! decision (open group, or a live invitation) is evaluated inside the same
//! transaction as the insert, and the insert itself is
//! `ON CONFLICT DO NOTHING` so concurrent joins for the same (group, user)
//! pair collapse to a single row.  The first successful writer's accept
//! decision wins; the loser's is discarded.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use oremus_shared::{CursorKey, GroupId, GroupMember, Membership, UserId};

use crate::database::{from_millis, from_millis_opt, ts_millis, Database};
use crate::error::{Result, StoreError};
use crate::query::{Dir, Predicate, SelectSpec};
use crate::users::row_to_user_at;

/// Filters for the member listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberFilter {
    /// List pending join requests instead of accepted members.
    pub requests: bool,
    /// Restrict on moderator standing.
    pub moderator: Option<bool>,
    /// Tri-state member-ban filter: banned only / unbanned only / all.
    pub banned: Option<bool>,
}

impl Database {
    // ------------------------------------------------------------------
    // State queries
    // ------------------------------------------------------------------

    pub fn get_membership(&self, group_id: GroupId, user_id: UserId) -> Result<Option<Membership>> {
        membership_row(self.conn(), group_id, user_id).map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Idempotent join.  Inserts a membership for (group, user), accepted
    /// immediately when the group is open or a live invitation exists.  A
    /// consumed invitation is deleted in the same transaction.  Returns the
    /// membership row that won (which may predate this call).
    pub fn upsert_join(
        &mut self,
        group_id: GroupId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Membership> {
        let tx = self.conn_mut().transaction()?;

        let membership_type: String = tx
            .query_row(
                "SELECT membership_type FROM groups WHERE id = ?1",
                params![group_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        let invited: i64 = tx.query_row(
            "SELECT COUNT(*) FROM invitations WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;

        let auto_accept = membership_type == "open" || invited > 0;
        let accepted_at = auto_accept.then(|| ts_millis(now));

        tx.execute(
            "INSERT INTO memberships (group_id, user_id, requested_at, accepted_at, moderator_since)
             VALUES (?1, ?2, ?3, ?4, NULL)
             ON CONFLICT (group_id, user_id) DO NOTHING",
            params![
                group_id.to_string(),
                user_id.to_string(),
                ts_millis(now),
                accepted_at,
            ],
        )?;

        if invited > 0 {
            tx.execute(
                "DELETE FROM invitations WHERE group_id = ?1 AND user_id = ?2",
                params![group_id.to_string(), user_id.to_string()],
            )?;
        }

        let membership = membership_row(&tx, group_id, user_id)?.ok_or(StoreError::NotFound)?;
        tx.commit()?;
        Ok(membership)
    }

    /// Accept a pending request.  Returns `false` if the membership was
    /// already accepted.
    pub fn accept_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE memberships SET accepted_at = ?3
             WHERE group_id = ?1 AND user_id = ?2 AND accepted_at IS NULL",
            params![group_id.to_string(), user_id.to_string(), ts_millis(now)],
        )?;
        Ok(affected > 0)
    }

    /// Grant or revoke moderator standing.
    pub fn set_moderator(
        &self,
        group_id: GroupId,
        user_id: UserId,
        on: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE memberships SET moderator_since = ?3
             WHERE group_id = ?1 AND user_id = ?2",
            params![
                group_id.to_string(),
                user_id.to_string(),
                on.then(|| ts_millis(now)),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete a membership (leave or kick).  Returns `true` if one existed.
    pub fn remove_membership(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM memberships WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    /// Member listing, ascending by acceptance time (requests mode: by
    /// request time), user id tiebreak.  Returns each row with the cursor
    /// key that resumes after it.
    pub fn list_members(
        &self,
        group_id: GroupId,
        filter: MemberFilter,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(GroupMember, CursorKey)>> {
        let sort_col = if filter.requests {
            "m.requested_at"
        } else {
            "m.accepted_at"
        };

        let base = "SELECT u.id, u.username, u.name, u.bio, u.profile_image, u.banner_image, \
                    u.created_at, m.group_id, m.user_id, m.requested_at, m.accepted_at, \
                    m.moderator_since, CASE WHEN b.user_id IS NOT NULL THEN 1 ELSE 0 END AS banned \
                    FROM memberships m \
                    JOIN users u ON u.id = m.user_id \
                    LEFT JOIN member_bans b ON b.group_id = m.group_id AND b.user_id = m.user_id";

        let pending_clause = if filter.requests {
            "m.accepted_at IS NULL"
        } else {
            "m.accepted_at IS NOT NULL"
        };

        let moderator_pred = filter.moderator.map(|on| {
            Predicate::new(
                if on {
                    "m.moderator_since IS NOT NULL"
                } else {
                    "m.moderator_since IS NULL"
                },
                vec![],
            )
        });

        let banned_pred = filter.banned.map(|on| {
            Predicate::new(
                if on {
                    "b.user_id IS NOT NULL"
                } else {
                    "b.user_id IS NULL"
                },
                vec![],
            )
        });

        let keyset = cursor
            .map(|key| Predicate::keyset(&[(sort_col, Dir::Asc), ("m.user_id", Dir::Asc)], key));

        let spec = SelectSpec::new(
            base,
            vec![(sort_col.to_string(), Dir::Asc), ("m.user_id".to_string(), Dir::Asc)],
            limit,
        )
        .and(Predicate::eq("m.group_id", group_id.to_string()))
        .and(Predicate::new(pending_clause, vec![]))
        .and_opt(moderator_pred)
        .and_opt(banned_pred)
        .and_opt(keyset);

        let mut stmt = self.conn().prepare(&spec.sql())?;
        let rows = stmt.query_map(rusqlite::params_from_iter(spec.params()), |row| {
            let user = row_to_user_at(row, 0)?;
            let membership = membership_from_row_at(row, 7)?;
            let banned: i64 = row.get(12)?;
            Ok(GroupMember {
                user,
                membership,
                banned: banned != 0,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            let member = row?;
            let sort_ts = if filter.requests {
                ts_millis(member.membership.requested_at)
            } else {
                member.membership.accepted_at.map(ts_millis).unwrap_or(0)
            };
            let key = CursorKey::new(vec![sort_ts], member.membership.user_id.to_string());
            out.push((member, key));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn membership_row(
    conn: &Connection,
    group_id: GroupId,
    user_id: UserId,
) -> Result<Option<Membership>> {
    conn.query_row(
        "SELECT group_id, user_id, requested_at, accepted_at, moderator_since
         FROM memberships WHERE group_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), user_id.to_string()],
        membership_from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn membership_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Membership> {
    membership_from_row_at(row, 0)
}

pub(crate) fn membership_from_row_at(
    row: &rusqlite::Row<'_>,
    base: usize,
) -> rusqlite::Result<Membership> {
    let group_str: String = row.get(base)?;
    let user_str: String = row.get(base + 1)?;
    let group_id = GroupId::parse(&group_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(base, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let user_id = UserId::parse(&user_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(base + 1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Membership {
        group_id,
        user_id,
        requested_at: from_millis(row.get(base + 2)?)?,
        accepted_at: from_millis_opt(row.get(base + 3)?)?,
        moderator_since: from_millis_opt(row.get(base + 4)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use oremus_shared::{Group, MembershipType, User};

    fn seed_user(db: &Database, username: &str) -> UserId {
        let u = User {
            id: UserId::new(),
            username: username.to_string(),
            name: username.to_string(),
            bio: None,
            profile_image: None,
            banner_image: None,
            created_at: Utc::now(),
        };
        db.create_user(&u).unwrap();
        u.id
    }

    fn seed_group(db: &mut Database, admin: UserId, ty: MembershipType) -> GroupId {
        let g = Group {
            id: GroupId::new(),
            name: "g".to_string(),
            description: String::new(),
            membership_type: ty,
            admin_id: admin,
            banner_image: None,
            reminder_id: None,
            created_at: Utc::now(),
        };
        db.create_group(&g, None).unwrap();
        g.id
    }

    #[test]
    fn open_group_join_auto_accepts() {
        let mut db = Database::open_in_memory().unwrap();
        let admin = seed_user(&db, "admin");
        let joiner = seed_user(&db, "joiner");
        let group = seed_group(&mut db, admin, MembershipType::Open);

        let m = db.upsert_join(group, joiner, Utc::now()).unwrap();
        assert!(m.is_accepted());
        assert!(!m.is_moderator());
    }

    #[test]
    fn private_group_join_is_pending() {
        let mut db = Database::open_in_memory().unwrap();
        let admin = seed_user(&db, "admin");
        let joiner = seed_user(&db, "joiner");
        let group = seed_group(&mut db, admin, MembershipType::Private);

        let m = db.upsert_join(group, joiner, Utc::now()).unwrap();
        assert!(!m.is_accepted());
    }

    #[test]
    fn invitation_auto_accepts_and_is_consumed() {
        let mut db = Database::open_in_memory().unwrap();
        let admin = seed_user(&db, "admin");
        let joiner = seed_user(&db, "joiner");
        let group = seed_group(&mut db, admin, MembershipType::Private);

        db.create_invitation(group, joiner, Utc::now()).unwrap();
        let m = db.upsert_join(group, joiner, Utc::now()).unwrap();
        assert!(m.is_accepted());
        assert!(db.get_invitation(group, joiner).unwrap().is_none());
    }

    #[test]
    fn duplicate_join_keeps_first_row() {
        let mut db = Database::open_in_memory().unwrap();
        let admin = seed_user(&db, "admin");
        let joiner = seed_user(&db, "joiner");
        let group = seed_group(&mut db, admin, MembershipType::Open);

        let first = db.upsert_join(group, joiner, Utc::now()).unwrap();
        let second = db
            .upsert_join(group, joiner, Utc::now() + Duration::seconds(5))
            .unwrap();
        assert_eq!(first, second);

        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM memberships WHERE group_id = ?1 AND user_id = ?2",
                params![group.to_string(), joiner.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn join_unknown_group_is_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let joiner = seed_user(&db, "joiner");
        let err = db.upsert_join(GroupId::new(), joiner, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn accept_and_promote() {
        let mut db = Database::open_in_memory().unwrap();
        let admin = seed_user(&db, "admin");
        let joiner = seed_user(&db, "joiner");
        let group = seed_group(&mut db, admin, MembershipType::Private);

        db.upsert_join(group, joiner, Utc::now()).unwrap();
        assert!(db.accept_member(group, joiner, Utc::now()).unwrap());
        // Second accept is a no-op.
        assert!(!db.accept_member(group, joiner, Utc::now()).unwrap());

        db.set_moderator(group, joiner, true, Utc::now()).unwrap();
        let m = db.get_membership(group, joiner).unwrap().unwrap();
        assert!(m.is_moderator());

        db.set_moderator(group, joiner, false, Utc::now()).unwrap();
        let m = db.get_membership(group, joiner).unwrap().unwrap();
        assert!(!m.is_moderator());
    }

    #[test]
    fn member_listing_modes_and_pagination() {
        let mut db = Database::open_in_memory().unwrap();
        let admin = seed_user(&db, "admin");
        let group = seed_group(&mut db, admin, MembershipType::Private);

        let mut accepted = Vec::new();
        for i in 0..5 {
            let u = seed_user(&db, &format!("member{i}"));
            db.upsert_join(group, u, Utc::now()).unwrap();
            db.accept_member(group, u, Utc::now() + Duration::seconds(i))
                .unwrap();
            accepted.push(u);
        }
        let requester = seed_user(&db, "requester");
        db.upsert_join(group, requester, Utc::now()).unwrap();

        // Requests mode sees only the pending membership.
        let requests = db
            .list_members(group, MemberFilter { requests: true, ..Default::default() }, None, 10)
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.membership.user_id, requester);

        // Accepted mode: admin + 5, ascending accepted_at.
        let members = db
            .list_members(group, MemberFilter::default(), None, 10)
            .unwrap();
        assert_eq!(members.len(), 6);
        assert_eq!(members[0].0.membership.user_id, admin);

        // Page through with the cursor: pages are disjoint, order preserved.
        let page1 = db
            .list_members(group, MemberFilter::default(), None, 4)
            .unwrap();
        let cursor = page1.last().unwrap().1.clone();
        let page2 = db
            .list_members(group, MemberFilter::default(), Some(&cursor), 4)
            .unwrap();
        assert_eq!(page1.len() + page2.len(), 6);
        let all: Vec<UserId> = page1
            .iter()
            .chain(page2.iter())
            .map(|(m, _)| m.membership.user_id)
            .collect();
        let whole: Vec<UserId> = members.iter().map(|(m, _)| m.membership.user_id).collect();
        assert_eq!(all, whole);

        // Moderator filter: only the admin's membership qualifies.
        let mods = db
            .list_members(
                group,
                MemberFilter { moderator: Some(true), ..Default::default() },
                None,
                10,
            )
            .unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].0.membership.user_id, admin);

        // Ban filter.
        db.set_member_ban(group, accepted[0], true, Utc::now()).unwrap();
        let banned = db
            .list_members(
                group,
                MemberFilter { banned: Some(true), ..Default::default() },
                None,
                10,
            )
            .unwrap();
        assert_eq!(banned.len(), 1);
        assert!(banned[0].0.banned);
        assert_eq!(banned[0].0.membership.user_id, accepted[0]);
    }
}
