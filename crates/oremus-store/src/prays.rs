//! Pray records: one row per act of praying for a prayer.
//!
//! Rows are append-only; repeat prays by the same user are separate rows
//! (the rate limit lives in the service layer and reads `latest_pray_at`).

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use oremus_shared::{CursorKey, PrayId, PrayerId, PrayerPray, UserId};

use crate::database::{from_millis, from_millis_opt, ts_millis, Database};
use crate::error::Result;
use crate::query::{Dir, Predicate, SelectSpec};

impl Database {
    pub fn insert_pray(&self, pray: &PrayerPray) -> Result<()> {
        self.conn().execute(
            "INSERT INTO prayer_prays (id, prayer_id, user_id, value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pray.id.to_string(),
                pray.prayer_id.to_string(),
                pray.user_id.to_string(),
                pray.value,
                ts_millis(pray.created_at),
            ],
        )?;
        Ok(())
    }

    /// Time of the user's most recent pray on this prayer, if any.
    pub fn latest_pray_at(
        &self,
        prayer_id: PrayerId,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>> {
        let millis: Option<i64> = self
            .conn()
            .query_row(
                "SELECT max(created_at) FROM prayer_prays
                 WHERE prayer_id = ?1 AND user_id = ?2",
                params![prayer_id.to_string(), user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        from_millis_opt(millis).map_err(Into::into)
    }

    pub fn pray_count(&self, prayer_id: PrayerId) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM prayer_prays WHERE prayer_id = ?1",
                params![prayer_id.to_string()],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn has_prayed(&self, prayer_id: PrayerId, user_id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM prayer_prays WHERE prayer_id = ?1 AND user_id = ?2",
            params![prayer_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Prays on one prayer, newest first, keyset-paginated.
    pub fn list_prays(
        &self,
        prayer_id: PrayerId,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(PrayerPray, CursorKey)>> {
        let keyset = cursor
            .map(|key| Predicate::keyset(&[("r.created_at", Dir::Desc), ("r.id", Dir::Asc)], key));
        let spec = SelectSpec::new(
            "SELECT r.id, r.prayer_id, r.user_id, r.value, r.created_at FROM prayer_prays r",
            vec![("r.created_at".into(), Dir::Desc), ("r.id".into(), Dir::Asc)],
            limit,
        )
        .and(Predicate::eq("r.prayer_id", prayer_id.to_string()))
        .and_opt(keyset);

        let mut stmt = self.conn().prepare(&spec.sql())?;
        let rows = stmt.query_map(rusqlite::params_from_iter(spec.params()), |row| {
            let pray = row_to_pray(row)?;
            let created: i64 = row.get(4)?;
            Ok((pray, created))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (pray, created) = row?;
            let key = CursorKey::new(vec![created], pray.id.to_string());
            out.push((pray, key));
        }
        Ok(out)
    }
}

fn row_to_pray(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrayerPray> {
    let id_str: String = row.get(0)?;
    let prayer_str: String = row.get(1)?;
    let user_str: String = row.get(2)?;
    let id = PrayId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let prayer_id = PrayerId::parse(&prayer_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let user_id = UserId::parse(&user_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(PrayerPray {
        id,
        prayer_id,
        user_id,
        value: row.get(3)?,
        created_at: from_millis(row.get(4)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use oremus_shared::{Prayer, User};

    fn seed(db: &mut Database) -> (UserId, PrayerId) {
        let u = User {
            id: UserId::new(),
            username: "u".to_string(),
            name: "u".to_string(),
            bio: None,
            profile_image: None,
            banner_image: None,
            created_at: Utc::now(),
        };
        db.create_user(&u).unwrap();
        let p = Prayer {
            id: PrayerId::new(),
            author_id: u.id,
            group_id: None,
            corporate_id: None,
            anon: false,
            value: "v".to_string(),
            created_at: Utc::now(),
            media: vec![],
            verses: vec![],
        };
        db.create_prayer(&p).unwrap();
        (u.id, p.id)
    }

    #[test]
    fn counts_and_latest() {
        let mut db = Database::open_in_memory().unwrap();
        let (user, prayer) = seed(&mut db);
        let base = Utc::now();

        assert_eq!(db.pray_count(prayer).unwrap(), 0);
        assert!(db.latest_pray_at(prayer, user).unwrap().is_none());

        for i in 0..3 {
            db.insert_pray(&PrayerPray {
                id: PrayId::new(),
                prayer_id: prayer,
                user_id: user,
                value: None,
                created_at: base + Duration::seconds(i),
            })
            .unwrap();
        }

        assert_eq!(db.pray_count(prayer).unwrap(), 3);
        assert!(db.has_prayed(prayer, user).unwrap());
        let latest = db.latest_pray_at(prayer, user).unwrap().unwrap();
        assert_eq!(ts_millis(latest), ts_millis(base + Duration::seconds(2)));
    }

    #[test]
    fn listing_newest_first_and_paginates() {
        let mut db = Database::open_in_memory().unwrap();
        let (user, prayer) = seed(&mut db);
        let base = Utc::now();

        for i in 0..5 {
            db.insert_pray(&PrayerPray {
                id: PrayId::new(),
                prayer_id: prayer,
                user_id: user,
                value: Some(format!("note {i}")),
                created_at: base + Duration::seconds(i),
            })
            .unwrap();
        }

        let first = db.list_prays(prayer, None, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].0.value.as_deref(), Some("note 4"));

        let rest = db.list_prays(prayer, Some(&first[2].1), 10).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].0.value.as_deref(), Some("note 0"));
    }
}
