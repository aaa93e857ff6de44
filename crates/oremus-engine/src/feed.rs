//! The feed query engine: every paginated read surface.
//!
//! Each listing follows the same shape: decode the caller's cursor,
//! check the coarse visibility guard, ask the store for `page + 1` rows,
//! pop the sentinel row, and re-encode the last kept row's sort key as
//! `next_cursor`.  Redaction of anonymous authors happens after all
//! counting, never before.

use chrono::{Duration, DurationRound, Utc};

use oremus_shared::{
    policy, CorporateId, CorporatePrayer, CursorError, CursorKey, DomainError, DomainResult, Group,
    GroupId, GroupMember, Notification, Page, Prayer, PrayerId, PrayerPray, PrayerView, UserId,
};
use oremus_store::{Database, FeedMode, MemberFilter};

use crate::engine::Engine;

/// Fixed page size for prayer, campaign, and group listings.
pub const PAGE_SIZE_PRAYERS: i64 = 10;
pub const PAGE_SIZE_GROUPS: i64 = 10;
/// Member and notification listings page larger.
pub const PAGE_SIZE_MEMBERS: i64 = 20;

/// Decode an opaque cursor token, if present.
pub(crate) fn decode_cursor(cursor: Option<&str>) -> DomainResult<Option<CursorKey>> {
    cursor
        .map(CursorKey::decode)
        .transpose()
        .map_err(|e: CursorError| DomainError::InvalidParameters(format!("cursor: {e}")))
}

/// Turn an N+1 row fetch into a page: pop the sentinel, encode the last
/// kept row's key.
pub(crate) fn assemble_page<T>(mut rows: Vec<(T, CursorKey)>, limit: i64) -> Page<T> {
    let mut next_cursor = None;
    if rows.len() as i64 > limit {
        rows.truncate(limit as usize);
        next_cursor = rows.last().map(|(_, key)| key.encode());
    }
    Page {
        items: rows.into_iter().map(|(item, _)| item).collect(),
        next_cursor,
    }
}

/// Join a prayer with its per-viewer display facts, redacting last.
pub(crate) fn build_prayer_view(
    db: &Database,
    viewer: Option<UserId>,
    prayer: Prayer,
) -> DomainResult<PrayerView> {
    let pray_count = db.pray_count(prayer.id)?;
    let viewer_has_prayed = match viewer {
        Some(v) => db.has_prayed(prayer.id, v)?,
        None => false,
    };
    let pinned = match prayer.group_id {
        Some(group_id) => db.get_pinned_prayer(group_id)? == Some(prayer.id),
        None => false,
    };
    let author = if policy::author_visible(&prayer, viewer) {
        Some(db.get_user(prayer.author_id)?)
    } else {
        None
    };

    Ok(PrayerView {
        prayer,
        author,
        pray_count,
        viewer_has_prayed,
        pinned,
    })
}

fn views_page(
    db: &Database,
    viewer: Option<UserId>,
    rows: Vec<(Prayer, CursorKey)>,
    limit: i64,
) -> DomainResult<Page<PrayerView>> {
    let page = assemble_page(rows, limit);
    let items = page
        .items
        .into_iter()
        .map(|prayer| build_prayer_view(db, viewer, prayer))
        .collect::<DomainResult<Vec<_>>>()?;
    Ok(Page {
        items,
        next_cursor: page.next_cursor,
    })
}

impl Engine {
    /// Personal feed over ungrouped prayers.
    pub async fn fetch_feed(
        &self,
        viewer: Option<UserId>,
        mode: FeedMode,
        cursor: Option<&str>,
    ) -> DomainResult<Page<PrayerView>> {
        let key = decode_cursor(cursor)?;
        let db = self.db().await;
        let rows = db.list_feed_prayers(viewer, mode, key.as_ref(), PAGE_SIZE_PRAYERS + 1)?;
        views_page(&db, viewer, rows, PAGE_SIZE_PRAYERS)
    }

    /// Prayers of one group (or one campaign within it), pinned first.
    ///
    /// Private groups are indistinguishable from absent ones for
    /// non-members.
    pub async fn fetch_group_prayers(
        &self,
        viewer: Option<UserId>,
        group_id: GroupId,
        corporate_id: Option<CorporateId>,
        cursor: Option<&str>,
    ) -> DomainResult<Page<PrayerView>> {
        let key = decode_cursor(cursor)?;
        let db = self.db().await;
        require_group_visible(&db, viewer, group_id)?;
        let rows = db.list_group_prayers(
            group_id,
            corporate_id,
            viewer,
            key.as_ref(),
            PAGE_SIZE_PRAYERS + 1,
        )?;
        views_page(&db, viewer, rows, PAGE_SIZE_PRAYERS)
    }

    /// One user's profile listing.  Anonymous prayers appear only to the
    /// author themselves.
    pub async fn fetch_user_prayers(
        &self,
        viewer: Option<UserId>,
        author: UserId,
        cursor: Option<&str>,
    ) -> DomainResult<Page<PrayerView>> {
        let key = decode_cursor(cursor)?;
        let db = self.db().await;
        // Resolve the author up front so a bogus id reads as absent.
        db.get_user(author)?;
        let rows = db.list_user_prayers(author, viewer, key.as_ref(), PAGE_SIZE_PRAYERS + 1)?;
        views_page(&db, viewer, rows, PAGE_SIZE_PRAYERS)
    }

    /// Group discovery: newest first, private groups hidden from
    /// non-members, optional substring search and member-of filter.
    pub async fn fetch_groups(
        &self,
        viewer: Option<UserId>,
        search: Option<&str>,
        member_of: Option<UserId>,
        cursor: Option<&str>,
    ) -> DomainResult<Page<Group>> {
        let key = decode_cursor(cursor)?;
        let db = self.db().await;
        let rows = db.list_groups(viewer, search, member_of, key.as_ref(), PAGE_SIZE_GROUPS + 1)?;
        Ok(assemble_page(rows, PAGE_SIZE_GROUPS))
    }

    /// Members of a group.  The pending-requests view is moderator-only.
    pub async fn fetch_members(
        &self,
        viewer: Option<UserId>,
        group_id: GroupId,
        filter: MemberFilter,
        cursor: Option<&str>,
    ) -> DomainResult<Page<GroupMember>> {
        let key = decode_cursor(cursor)?;
        let db = self.db().await;
        require_group_visible(&db, viewer, group_id)?;

        if filter.requests {
            let membership = match viewer {
                Some(v) => db.get_membership(group_id, v)?,
                None => None,
            };
            if !policy::can_moderate(membership.as_ref()) {
                return Err(DomainError::not_allowed(
                    "only moderators may list membership requests",
                ));
            }
        }

        let rows = db.list_members(group_id, filter, key.as_ref(), PAGE_SIZE_MEMBERS + 1)?;
        Ok(assemble_page(rows, PAGE_SIZE_MEMBERS))
    }

    /// Campaigns of a group ranked by urgency.  `minutes_offset` shifts
    /// the reference clock to the caller's local minute (0 = UTC); the
    /// minute truncation keeps rankings stable across a page walk.
    pub async fn fetch_corporate_prayers(
        &self,
        viewer: Option<UserId>,
        group_id: GroupId,
        minutes_offset: i64,
        cursor: Option<&str>,
    ) -> DomainResult<Page<CorporatePrayer>> {
        let key = decode_cursor(cursor)?;
        let now = Utc::now()
            .duration_trunc(Duration::minutes(1))
            .map_err(|e| DomainError::Internal(e.to_string()))?
            + Duration::minutes(minutes_offset);

        let db = self.db().await;
        require_group_visible(&db, viewer, group_id)?;
        let rows = db.list_corporate_prayers(group_id, now, key.as_ref(), PAGE_SIZE_PRAYERS + 1)?;
        Ok(assemble_page(rows, PAGE_SIZE_PRAYERS))
    }

    /// Prays recorded on one prayer, newest first.
    pub async fn fetch_prays(
        &self,
        viewer: Option<UserId>,
        prayer_id: PrayerId,
        cursor: Option<&str>,
    ) -> DomainResult<Page<PrayerPray>> {
        let key = decode_cursor(cursor)?;
        let db = self.db().await;
        require_prayer_visible(&db, viewer, prayer_id)?;
        let rows = db.list_prays(prayer_id, key.as_ref(), PAGE_SIZE_MEMBERS + 1)?;
        Ok(assemble_page(rows, PAGE_SIZE_MEMBERS))
    }

    /// The caller's own notification stream.
    pub async fn fetch_notifications(
        &self,
        user_id: UserId,
        cursor: Option<&str>,
    ) -> DomainResult<Page<Notification>> {
        let key = decode_cursor(cursor)?;
        let db = self.db().await;
        let rows = db.list_notifications(user_id, key.as_ref(), PAGE_SIZE_MEMBERS + 1)?;
        Ok(assemble_page(rows, PAGE_SIZE_MEMBERS))
    }
}

/// NotFound (not Forbidden) when a private group is invisible to the
/// viewer, so probing cannot distinguish hidden from absent.
pub(crate) fn require_group_visible(
    db: &Database,
    viewer: Option<UserId>,
    group_id: GroupId,
) -> DomainResult<Group> {
    let group = db.get_group(group_id)?;
    let membership = match viewer {
        Some(v) => db.get_membership(group_id, v)?,
        None => None,
    };
    if !policy::can_view_group(&group, membership.as_ref()) {
        return Err(DomainError::NotFound);
    }
    Ok(group)
}

/// Full per-prayer visibility check for single-item surfaces.
pub(crate) fn require_prayer_visible(
    db: &Database,
    viewer: Option<UserId>,
    prayer_id: PrayerId,
) -> DomainResult<Prayer> {
    let prayer = db.get_prayer(prayer_id)?;
    let group = prayer.group_id.map(|g| db.get_group(g)).transpose()?;
    let membership = match (viewer, prayer.group_id) {
        (Some(v), Some(g)) => db.get_membership(g, v)?,
        _ => None,
    };
    let has_prayed = match viewer {
        Some(v) => db.has_prayed(prayer.id, v)?,
        None => false,
    };
    if !policy::can_view_prayer(&prayer, group.as_ref(), viewer, membership.as_ref(), has_prayed) {
        return Err(DomainError::NotFound);
    }
    Ok(prayer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use oremus_shared::MembershipType;

    #[tokio::test]
    async fn feed_pages_ten_with_cursor_chain() {
        let engine = testing::engine().await;
        let author = testing::seed_user(&engine, "author").await;
        for i in 0..12 {
            testing::seed_feed_prayer(&engine, author, i).await;
        }

        let first = engine.fetch_feed(None, FeedMode::Home, None).await.unwrap();
        assert_eq!(first.items.len(), 10);
        let token = first.next_cursor.expect("more rows remain");

        let second = engine
            .fetch_feed(None, FeedMode::Home, Some(&token))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.next_cursor.is_none());

        let mut seen: Vec<PrayerId> = first.items.iter().map(|v| v.prayer.id).collect();
        seen.extend(second.items.iter().map(|v| v.prayer.id));
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 12);
    }

    #[tokio::test]
    async fn garbage_cursor_is_invalid_parameters() {
        let engine = testing::engine().await;
        let err = engine
            .fetch_feed(None, FeedMode::Home, Some("!!not-a-cursor!!"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid-parameters");
    }

    #[tokio::test]
    async fn private_group_listing_reads_as_not_found() {
        let engine = testing::engine().await;
        let admin = testing::seed_user(&engine, "admin").await;
        let outsider = testing::seed_user(&engine, "outsider").await;
        let group = testing::seed_group(&engine, admin, MembershipType::Private).await;

        let err = engine
            .fetch_group_prayers(Some(outsider), group, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not-found");

        // The admin (accepted member) sees it fine.
        let ok = engine
            .fetch_group_prayers(Some(admin), group, None, None)
            .await
            .unwrap();
        assert!(ok.items.is_empty());
    }

    #[tokio::test]
    async fn discovery_hides_private_groups_from_anonymous() {
        let engine = testing::engine().await;
        let admin = testing::seed_user(&engine, "admin").await;
        testing::seed_group(&engine, admin, MembershipType::Open).await;
        testing::seed_group(&engine, admin, MembershipType::Private).await;

        let anon = engine.fetch_groups(None, None, None, None).await.unwrap();
        assert_eq!(anon.items.len(), 1);

        let as_admin = engine
            .fetch_groups(Some(admin), None, None, None)
            .await
            .unwrap();
        assert_eq!(as_admin.items.len(), 2);
    }

    #[tokio::test]
    async fn requests_listing_is_moderator_only() {
        let engine = testing::engine().await;
        let admin = testing::seed_user(&engine, "admin").await;
        let member = testing::seed_user(&engine, "member").await;
        let group = testing::seed_group(&engine, admin, MembershipType::Restricted).await;
        engine.join_group(member, group).await.unwrap();

        let filter = MemberFilter {
            requests: true,
            ..MemberFilter::default()
        };
        let err = engine
            .fetch_members(Some(member), group, filter.clone(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "operation-not-allowed");

        let requests = engine
            .fetch_members(Some(admin), group, filter, None)
            .await
            .unwrap();
        assert_eq!(requests.items.len(), 1);
        assert_eq!(requests.items[0].user.id, member);
    }

    #[tokio::test]
    async fn anon_prayer_redacted_in_feed_but_counted() {
        let engine = testing::engine().await;
        let author = testing::seed_user(&engine, "author").await;
        let viewer = testing::seed_user(&engine, "viewer").await;
        testing::seed_anon_feed_prayer(&engine, author).await;

        let feed = engine
            .fetch_feed(Some(viewer), FeedMode::Home, None)
            .await
            .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert!(feed.items[0].author.is_none());

        let own = engine
            .fetch_feed(Some(author), FeedMode::Home, None)
            .await
            .unwrap();
        assert_eq!(own.items[0].author.as_ref().unwrap().id, author);
    }
}
