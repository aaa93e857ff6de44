//! Prayer records and the keyset-paginated prayer listings.
//!
//! Every listing follows the same composition: tenancy predicate,
//! visibility predicate, optional block exclusion, keyset bound, composite
//! ORDER BY, LIMIT.  Each returned row is paired with the cursor key that
//! resumes the listing immediately after it.

use rusqlite::{params, Connection};

use oremus_shared::{CorporateId, CursorKey, GroupId, Prayer, PrayerId, UserId};

use crate::database::{from_millis, ts_millis, Database};
use crate::error::{Result, StoreError};
use crate::query::{Dir, Predicate, SelectSpec};

/// Personal-feed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// All ungrouped posts.
    Home,
    /// Posts by authors the viewer follows.
    Followers,
    /// Posts by authors the viewer has prayed for, excluding the viewer.
    Neighbor,
}

/// Activity time of a prayer: its creation time, boosted by the most recent
/// pray on it.  Drives the personal-feed ordering.
const ACTIVITY_EXPR: &str = "max(p.created_at, ifnull((SELECT max(pp.created_at) \
                             FROM prayer_prays pp WHERE pp.prayer_id = p.id), 0))";

/// Pin rank of a prayer within its group listing.
const RANK_EXPR: &str = "CASE WHEN pin.prayer_id IS NOT NULL THEN 1 ELSE 0 END";

const PRAYER_COLS: &str =
    "p.id, p.author_id, p.group_id, p.corporate_id, p.anon, p.value, p.created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a prayer together with its media paths and verse ids in one
    /// transaction.
    pub fn create_prayer(&mut self, prayer: &Prayer) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO prayers (id, author_id, group_id, corporate_id, anon, value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                prayer.id.to_string(),
                prayer.author_id.to_string(),
                prayer.group_id.map(|g| g.to_string()),
                prayer.corporate_id.map(|c| c.to_string()),
                prayer.anon,
                prayer.value,
                ts_millis(prayer.created_at),
            ],
        )?;

        for (position, path) in prayer.media.iter().enumerate() {
            tx.execute(
                "INSERT INTO prayer_media (prayer_id, position, path) VALUES (?1, ?2, ?3)",
                params![prayer.id.to_string(), position as i64, path],
            )?;
        }
        for verse_id in &prayer.verses {
            tx.execute(
                "INSERT OR IGNORE INTO prayer_verses (prayer_id, verse_id) VALUES (?1, ?2)",
                params![prayer.id.to_string(), verse_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single prayer by id, media and verses included.
    ///
    /// Deliberately unfiltered by blocks: a direct link to a previously
    /// seen post keeps working; listings never resurface it.
    pub fn get_prayer(&self, id: PrayerId) -> Result<Prayer> {
        let mut prayer = self
            .conn()
            .query_row(
                &format!("SELECT {PRAYER_COLS} FROM prayers p WHERE p.id = ?1"),
                params![id.to_string()],
                row_to_prayer,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        load_prayer_extras(self.conn(), &mut prayer)?;
        Ok(prayer)
    }

    /// Personal/global feed over ungrouped posts: activity time descending
    /// (recently-prayed-for posts are boosted), id tiebreak.
    pub fn list_feed_prayers(
        &self,
        viewer: Option<UserId>,
        mode: FeedMode,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(Prayer, CursorKey)>> {
        let base = format!(
            "SELECT {PRAYER_COLS}, {ACTIVITY_EXPR} AS activity_at FROM prayers p"
        );

        let mode_pred = match (mode, viewer) {
            (FeedMode::Home, _) => None,
            (FeedMode::Followers, Some(v)) => Some(Predicate::new(
                "p.author_id IN (SELECT following_id FROM user_follows WHERE follower_id = ?)",
                vec![v.to_string().into()],
            )),
            (FeedMode::Neighbor, Some(v)) => Some(Predicate::new(
                "p.author_id IN (SELECT pr.author_id FROM prayer_prays pn \
                 JOIN prayers pr ON pr.id = pn.prayer_id WHERE pn.user_id = ?) \
                 AND p.author_id <> ?",
                vec![v.to_string().into(), v.to_string().into()],
            )),
            // Follower/neighbor feeds require a signed-in viewer; an
            // anonymous caller gets the home predicate.
            (_, None) => None,
        };

        let blocks = viewer.map(|v| Predicate::not_blocked("p.author_id", &v.to_string()));
        let keyset = cursor
            .map(|key| Predicate::keyset(&[(ACTIVITY_EXPR, Dir::Desc), ("p.id", Dir::Asc)], key));

        let spec = SelectSpec::new(
            base,
            vec![("activity_at".to_string(), Dir::Desc), ("p.id".to_string(), Dir::Asc)],
            limit,
        )
        .and(Predicate::new(
            "p.group_id IS NULL AND p.corporate_id IS NULL",
            vec![],
        ))
        .and_opt(mode_pred)
        .and_opt(blocks)
        .and_opt(keyset);

        self.run_prayer_listing(&spec, |row| {
            let activity: i64 = row.get(7)?;
            Ok(vec![activity])
        })
    }

    /// Group (or campaign) prayer listing: pinned first, then newest,
    /// id tiebreak.  Per-row visibility follows the prayer policy: author,
    /// open group, accepted member, or grandfathered by an own pray.
    pub fn list_group_prayers(
        &self,
        group_id: GroupId,
        corporate_id: Option<CorporateId>,
        viewer: Option<UserId>,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(Prayer, CursorKey)>> {
        let base = format!(
            "SELECT {PRAYER_COLS}, {RANK_EXPR} AS rank FROM prayers p \
             LEFT JOIN pinned_prayers pin ON pin.group_id = p.group_id AND pin.prayer_id = p.id"
        );

        let visibility = match viewer {
            Some(v) => Predicate::new(
                "(p.author_id = ? \
                 OR EXISTS (SELECT 1 FROM groups g WHERE g.id = p.group_id AND g.membership_type = 'open') \
                 OR EXISTS (SELECT 1 FROM memberships m WHERE m.group_id = p.group_id \
                    AND m.user_id = ? AND m.accepted_at IS NOT NULL) \
                 OR EXISTS (SELECT 1 FROM prayer_prays pv WHERE pv.prayer_id = p.id AND pv.user_id = ?))",
                vec![
                    v.to_string().into(),
                    v.to_string().into(),
                    v.to_string().into(),
                ],
            ),
            None => Predicate::new(
                "EXISTS (SELECT 1 FROM groups g WHERE g.id = p.group_id AND g.membership_type = 'open')",
                vec![],
            ),
        };

        let corporate_pred = corporate_id.map(|c| Predicate::eq("p.corporate_id", c.to_string()));
        let blocks = viewer.map(|v| Predicate::not_blocked("p.author_id", &v.to_string()));
        let keyset = cursor.map(|key| {
            Predicate::keyset(
                &[(RANK_EXPR, Dir::Desc), ("p.created_at", Dir::Desc), ("p.id", Dir::Asc)],
                key,
            )
        });

        let spec = SelectSpec::new(
            base,
            vec![
                ("rank".to_string(), Dir::Desc),
                ("p.created_at".to_string(), Dir::Desc),
                ("p.id".to_string(), Dir::Asc),
            ],
            limit,
        )
        .and(Predicate::eq("p.group_id", group_id.to_string()))
        .and_opt(corporate_pred)
        .and(visibility)
        .and_opt(blocks)
        .and_opt(keyset);

        self.run_prayer_listing(&spec, |row| {
            let rank: i64 = row.get(7)?;
            Ok(vec![rank, row.get::<_, i64>(6)?])
        })
    }

    /// One user's profile listing, newest first.  Anonymous posts are
    /// hidden from every viewer but the author.
    pub fn list_user_prayers(
        &self,
        author: UserId,
        viewer: Option<UserId>,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(Prayer, CursorKey)>> {
        let base = format!("SELECT {PRAYER_COLS} FROM prayers p");

        let anon_pred = (viewer != Some(author)).then(|| Predicate::new("p.anon = 0", vec![]));

        // Group posts on a profile still honor the prayer visibility rules.
        let visibility = match viewer {
            Some(v) => Predicate::new(
                "(p.group_id IS NULL OR p.author_id = ? \
                 OR EXISTS (SELECT 1 FROM groups g WHERE g.id = p.group_id AND g.membership_type = 'open') \
                 OR EXISTS (SELECT 1 FROM memberships m WHERE m.group_id = p.group_id \
                    AND m.user_id = ? AND m.accepted_at IS NOT NULL) \
                 OR EXISTS (SELECT 1 FROM prayer_prays pv WHERE pv.prayer_id = p.id AND pv.user_id = ?))",
                vec![
                    v.to_string().into(),
                    v.to_string().into(),
                    v.to_string().into(),
                ],
            ),
            None => Predicate::new(
                "(p.group_id IS NULL OR EXISTS \
                 (SELECT 1 FROM groups g WHERE g.id = p.group_id AND g.membership_type = 'open'))",
                vec![],
            ),
        };

        let blocks = viewer.map(|v| Predicate::not_blocked("p.author_id", &v.to_string()));
        let keyset = cursor
            .map(|key| Predicate::keyset(&[("p.created_at", Dir::Desc), ("p.id", Dir::Asc)], key));

        let spec = SelectSpec::new(
            base,
            vec![("p.created_at".to_string(), Dir::Desc), ("p.id".to_string(), Dir::Asc)],
            limit,
        )
        .and(Predicate::eq("p.author_id", author.to_string()))
        .and_opt(anon_pred)
        .and(visibility)
        .and_opt(blocks)
        .and_opt(keyset);

        self.run_prayer_listing(&spec, |row| Ok(vec![row.get::<_, i64>(6)?]))
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a prayer and its attachments, prays, and pin reference.
    pub fn delete_prayer(&mut self, id: PrayerId) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        let pid = id.to_string();

        tx.execute("DELETE FROM prayer_prays WHERE prayer_id = ?1", params![pid])?;
        tx.execute("DELETE FROM prayer_media WHERE prayer_id = ?1", params![pid])?;
        tx.execute("DELETE FROM prayer_verses WHERE prayer_id = ?1", params![pid])?;
        tx.execute("DELETE FROM pinned_prayers WHERE prayer_id = ?1", params![pid])?;
        let affected = tx.execute("DELETE FROM prayers WHERE id = ?1", params![pid])?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared listing plumbing
    // ------------------------------------------------------------------

    fn run_prayer_listing(
        &self,
        spec: &SelectSpec,
        sort_parts: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<Vec<i64>>,
    ) -> Result<Vec<(Prayer, CursorKey)>> {
        let mut stmt = self.conn().prepare(&spec.sql())?;
        let rows = stmt.query_map(rusqlite::params_from_iter(spec.params()), |row| {
            let prayer = row_to_prayer(row)?;
            let parts = sort_parts(row)?;
            Ok((prayer, parts))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (mut prayer, parts) = row?;
            load_prayer_extras(self.conn(), &mut prayer)?;
            let key = CursorKey::new(parts, prayer.id.to_string());
            out.push((prayer, key));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` (in `PRAYER_COLS` order) to a [`Prayer`] with
/// media/verses left empty.
pub(crate) fn row_to_prayer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prayer> {
    let id_str: String = row.get(0)?;
    let author_str: String = row.get(1)?;
    let group_str: Option<String> = row.get(2)?;
    let corporate_str: Option<String> = row.get(3)?;

    let id = PrayerId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let author_id = UserId::parse(&author_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let group_id = group_str
        .map(|s| GroupId::parse(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let corporate_id = corporate_str
        .map(|s| CorporateId::parse(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Prayer {
        id,
        author_id,
        group_id,
        corporate_id,
        anon: row.get(4)?,
        value: row.get(5)?,
        created_at: from_millis(row.get(6)?)?,
        media: Vec::new(),
        verses: Vec::new(),
    })
}

fn load_prayer_extras(conn: &Connection, prayer: &mut Prayer) -> Result<()> {
    let mut stmt =
        conn.prepare("SELECT path FROM prayer_media WHERE prayer_id = ?1 ORDER BY position")?;
    let media = stmt.query_map(params![prayer.id.to_string()], |row| row.get(0))?;
    prayer.media = media.collect::<std::result::Result<Vec<String>, _>>()?;

    let mut stmt = conn
        .prepare("SELECT verse_id FROM prayer_verses WHERE prayer_id = ?1 ORDER BY verse_id")?;
    let verses = stmt.query_map(params![prayer.id.to_string()], |row| row.get(0))?;
    prayer.verses = verses.collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(())
}
