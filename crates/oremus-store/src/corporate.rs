//! Corporate prayer campaigns: time-boxed, group-wide prayer drives.
//!
//! The group listing ranks campaigns by urgency: campaigns ending soonest
//! first, then open-ended ones, then ended ones (most recently ended
//! first).  Urgency is computed against a caller-supplied "now" that the
//! service layer truncates to the minute, so a cursor minted on one page
//! keeps ranking rows identically for the rest of the walk.

use rusqlite::params;

use chrono::{DateTime, Utc};
use oremus_shared::{CorporateId, CorporatePrayer, CursorKey, GroupId, Reminder, ReminderId, UserId};

use crate::database::{from_millis, from_millis_opt, ts_millis, Database};
use crate::error::{Result, StoreError};
use crate::query::{Dir, Predicate, SelectSpec};

/// Urgency assigned to open-ended campaigns (seconds).  Larger than any
/// realistic remaining-time value, smaller than the ended band.
const NO_END_URGENCY: i64 = 10_000_000_000;

/// Base urgency of ended campaigns (seconds); their recency since ending
/// is added on top so fresher endings sort first within the band.
const ENDED_URGENCY_BASE: i64 = 100_000_000_000;

/// Urgency of a campaign row, in seconds, relative to `now_ms`.
///
/// `now_ms` is embedded as a literal because the expression appears in both
/// the select list and the keyset bound, and SQLite cannot reference a
/// select alias from WHERE.
fn urgency_expr(now_ms: i64) -> String {
    format!(
        "CASE WHEN c.ended_at IS NULL THEN {NO_END_URGENCY} \
         WHEN c.ended_at > {now_ms} THEN (c.ended_at - {now_ms}) / 1000 \
         ELSE {ENDED_URGENCY_BASE} + ({now_ms} - c.ended_at) / 1000 END"
    )
}

const CORPORATE_COLS: &str = "c.id, c.group_id, c.author_id, c.title, c.description, \
                              c.started_at, c.ended_at, c.reminder_id, c.created_at";

impl Database {
    /// Insert a campaign together with its optional reminder.
    pub fn create_corporate(
        &mut self,
        corporate: &CorporatePrayer,
        reminder: Option<&Reminder>,
    ) -> Result<()> {
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
            "INSERT INTO corporate_prayers
             (id, group_id, author_id, title, description, started_at, ended_at, reminder_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                corporate.id.to_string(),
                corporate.group_id.to_string(),
                corporate.author_id.to_string(),
                corporate.title,
                corporate.description,
                corporate.started_at.map(ts_millis),
                corporate.ended_at.map(ts_millis),
                corporate.reminder_id.map(|r| r.to_string()),
                ts_millis(corporate.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_corporate(&self, id: CorporateId) -> Result<CorporatePrayer> {
        self.conn()
            .query_row(
                &format!("SELECT {CORPORATE_COLS} FROM corporate_prayers c WHERE c.id = ?1"),
                params![id.to_string()],
                row_to_corporate,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Campaigns of a group ranked by urgency (see module docs), with
    /// creation time and id as tiebreaks.
    pub fn list_corporate_prayers(
        &self,
        group_id: GroupId,
        now: DateTime<Utc>,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(CorporatePrayer, CursorKey)>> {
        let urgency = urgency_expr(ts_millis(now));
        let base = format!(
            "SELECT {CORPORATE_COLS}, {urgency} AS urgency FROM corporate_prayers c"
        );

        let keyset = cursor.map(|key| {
            Predicate::keyset(
                &[
                    (urgency.as_str(), Dir::Asc),
                    ("c.created_at", Dir::Desc),
                    ("c.id", Dir::Asc),
                ],
                key,
            )
        });

        let spec = SelectSpec::new(
            base,
            vec![
                ("urgency".to_string(), Dir::Asc),
                ("c.created_at".to_string(), Dir::Desc),
                ("c.id".to_string(), Dir::Asc),
            ],
            limit,
        )
        .and(Predicate::eq("c.group_id", group_id.to_string()))
        .and_opt(keyset);

        let mut stmt = self.conn().prepare(&spec.sql())?;
        let rows = stmt.query_map(rusqlite::params_from_iter(spec.params()), |row| {
            let corporate = row_to_corporate(row)?;
            let urgency: i64 = row.get(9)?;
            let created: i64 = row.get(8)?;
            Ok((corporate, urgency, created))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (corporate, urgency, created) = row?;
            let key = CursorKey::new(vec![urgency, created], corporate.id.to_string());
            out.push((corporate, key));
        }
        Ok(out)
    }

    /// Overwrite the author-mutable fields.  Group and author never change.
    pub fn update_corporate(&self, corporate: &CorporatePrayer) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE corporate_prayers SET title = ?2, description = ?3,
             started_at = ?4, ended_at = ?5, reminder_id = ?6
             WHERE id = ?1",
            params![
                corporate.id.to_string(),
                corporate.title,
                corporate.description,
                corporate.started_at.map(ts_millis),
                corporate.ended_at.map(ts_millis),
                corporate.reminder_id.map(|r| r.to_string()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete a campaign and its reminder.  Prayers posted to the campaign
    /// are detached, not deleted: they remain in the group's listing.
    pub fn delete_corporate(&mut self, id: CorporateId) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        let cid = id.to_string();

        let reminder_id: Option<String> = tx
            .query_row(
                "SELECT reminder_id FROM corporate_prayers WHERE id = ?1",
                params![cid],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        tx.execute(
            "UPDATE prayers SET corporate_id = NULL WHERE corporate_id = ?1",
            params![cid],
        )?;
        tx.execute("DELETE FROM corporate_prayers WHERE id = ?1", params![cid])?;
        if let Some(reminder_id) = reminder_id {
            tx.execute("DELETE FROM reminders WHERE id = ?1", params![reminder_id])?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn row_to_corporate(row: &rusqlite::Row<'_>) -> rusqlite::Result<CorporatePrayer> {
    let id_str: String = row.get(0)?;
    let group_str: String = row.get(1)?;
    let author_str: String = row.get(2)?;
    let reminder_str: Option<String> = row.get(7)?;

    let id = CorporateId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let group_id = GroupId::parse(&group_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let author_id = UserId::parse(&author_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let reminder_id = reminder_str
        .map(|s| ReminderId::parse(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(CorporatePrayer {
        id,
        group_id,
        author_id,
        title: row.get(3)?,
        description: row.get(4)?,
        started_at: from_millis_opt(row.get(5)?)?,
        ended_at: from_millis_opt(row.get(6)?)?,
        reminder_id,
        created_at: from_millis(row.get(8)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use oremus_shared::{Group, MembershipType, User};

    fn seed_group(db: &mut Database) -> (UserId, GroupId) {
        let u = User {
            id: UserId::new(),
            username: "admin".to_string(),
            name: "admin".to_string(),
            bio: None,
            profile_image: None,
            banner_image: None,
            created_at: Utc::now(),
        };
        db.create_user(&u).unwrap();
        let g = Group {
            id: GroupId::new(),
            name: "g".to_string(),
            description: String::new(),
            membership_type: MembershipType::Open,
            admin_id: u.id,
            banner_image: None,
            reminder_id: None,
            created_at: Utc::now(),
        };
        db.create_group(&g, None).unwrap();
        (u.id, g.id)
    }

    fn campaign(
        group: GroupId,
        author: UserId,
        title: &str,
        ended_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> CorporatePrayer {
        CorporatePrayer {
            id: CorporateId::new(),
            group_id: group,
            author_id: author,
            title: title.to_string(),
            description: None,
            started_at: None,
            ended_at,
            reminder_id: None,
            created_at,
        }
    }

    #[test]
    fn round_trip_with_reminder() {
        let mut db = Database::open_in_memory().unwrap();
        let (author, group) = seed_group(&mut db);

        let reminder = Reminder {
            id: ReminderId::new(),
            time: "07:30".to_string(),
            days: "mon,thu".to_string(),
            created_at: Utc::now(),
        };
        let mut c = campaign(group, author, "week of prayer", None, Utc::now());
        c.reminder_id = Some(reminder.id);
        db.create_corporate(&c, Some(&reminder)).unwrap();

        let fetched = db.get_corporate(c.id).unwrap();
        assert_eq!(fetched.title, "week of prayer");
        assert_eq!(fetched.reminder_id, Some(reminder.id));
    }

    #[test]
    fn urgency_bands_order_the_listing() {
        let mut db = Database::open_in_memory().unwrap();
        let (author, group) = seed_group(&mut db);
        let now = Utc::now();

        let ending_soon = campaign(group, author, "soon", Some(now + Duration::hours(1)), now);
        let ending_later = campaign(group, author, "later", Some(now + Duration::days(3)), now);
        let open_ended = campaign(group, author, "open", None, now);
        let ended_recently =
            campaign(group, author, "just ended", Some(now - Duration::hours(2)), now);
        let ended_long_ago =
            campaign(group, author, "old", Some(now - Duration::days(30)), now);

        for c in [&open_ended, &ended_long_ago, &ending_later, &ended_recently, &ending_soon] {
            db.create_corporate(c, None).unwrap();
        }

        let listing = db.list_corporate_prayers(group, now, None, 10).unwrap();
        let titles: Vec<&str> = listing.iter().map(|(c, _)| c.title.as_str()).collect();
        assert_eq!(titles, vec!["soon", "later", "open", "just ended", "old"]);
    }

    #[test]
    fn cursor_resumes_with_same_ranking() {
        let mut db = Database::open_in_memory().unwrap();
        let (author, group) = seed_group(&mut db);
        let now = Utc::now();

        for i in 0..7 {
            let c = campaign(
                group,
                author,
                &format!("c{i}"),
                Some(now + Duration::hours(i + 1)),
                now,
            );
            db.create_corporate(&c, None).unwrap();
        }

        let first = db.list_corporate_prayers(group, now, None, 4).unwrap();
        assert_eq!(first.len(), 4);
        let rest = db
            .list_corporate_prayers(group, now, Some(&first[3].1), 10)
            .unwrap();
        assert_eq!(rest.len(), 3);

        let mut all: Vec<String> = first.iter().map(|(c, _)| c.title.clone()).collect();
        all.extend(rest.iter().map(|(c, _)| c.title.clone()));
        let expected: Vec<String> = (0..7).map(|i| format!("c{i}")).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn delete_detaches_prayers() {
        let mut db = Database::open_in_memory().unwrap();
        let (author, group) = seed_group(&mut db);
        let c = campaign(group, author, "drive", None, Utc::now());
        db.create_corporate(&c, None).unwrap();

        let p = oremus_shared::Prayer {
            id: oremus_shared::PrayerId::new(),
            author_id: author,
            group_id: Some(group),
            corporate_id: Some(c.id),
            anon: false,
            value: "v".to_string(),
            created_at: Utc::now(),
            media: vec![],
            verses: vec![],
        };
        db.create_prayer(&p).unwrap();

        db.delete_corporate(c.id).unwrap();
        assert!(matches!(db.get_corporate(c.id), Err(StoreError::NotFound)));

        let detached = db.get_prayer(p.id).unwrap();
        assert_eq!(detached.corporate_id, None);
        assert_eq!(detached.group_id, Some(group));
    }

    #[test]
    fn update_missing_campaign_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let c = campaign(GroupId::new(), UserId::new(), "ghost", None, Utc::now());
        assert!(matches!(db.update_corporate(&c), Err(StoreError::NotFound)));
    }
}
