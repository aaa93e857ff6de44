//! Prayer, pray, and campaign operations.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use oremus_shared::{
    policy, CorporateId, CorporatePrayer, DomainError, DomainResult, GroupId, PrayId, Prayer,
    PrayerId, PrayerPray, PrayerView, UserId,
};

use crate::engine::Engine;
use crate::feed::{build_prayer_view, require_prayer_visible};
use crate::groups::ReminderDraft;

/// Author-supplied prayer fields.  At most one scope applies: personal
/// (neither id), a group, or a campaign (which implies its group).
#[derive(Debug, Clone, Deserialize)]
pub struct PrayerDraft {
    pub group_id: Option<GroupId>,
    pub corporate_id: Option<CorporateId>,
    pub anon: bool,
    pub value: String,
    pub media: Vec<String>,
    pub verses: Vec<i64>,
}

/// Fields for creating a campaign.
#[derive(Debug, Clone, Deserialize)]
pub struct CorporateDraft {
    pub group_id: GroupId,
    pub title: String,
    pub description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reminder: Option<ReminderDraft>,
}

/// Fields for updating a campaign.  Scope (group, author) is fixed.
#[derive(Debug, Clone, Deserialize)]
pub struct CorporateUpdate {
    pub title: String,
    pub description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

fn validate_window(
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
) -> DomainResult<()> {
    if let (Some(start), Some(end)) = (started_at, ended_at) {
        if end < start {
            return Err(DomainError::InvalidParameters(
                "campaign end precedes its start".to_string(),
            ));
        }
    }
    Ok(())
}

impl Engine {
    // ------------------------------------------------------------------
    // Prayers
    // ------------------------------------------------------------------

    /// Post a prayer.  Posting into a group requires accepted
    /// membership; posting into a campaign posts into its group.
    pub async fn create_prayer(&self, author: UserId, draft: PrayerDraft) -> DomainResult<Prayer> {
        if draft.value.trim().is_empty() {
            return Err(DomainError::InvalidParameters("prayer text is empty".to_string()));
        }

        let mut db = self.db().await;
        if db.is_user_banned(author)? {
            return Err(DomainError::not_allowed("account is suspended"));
        }
        db.get_user(author)?;

        let group_id = match draft.corporate_id {
            Some(corporate_id) => {
                let campaign = db.get_corporate(corporate_id)?;
                if draft.group_id.is_some_and(|g| g != campaign.group_id) {
                    return Err(DomainError::InvalidParameters(
                        "campaign does not belong to that group".to_string(),
                    ));
                }
                Some(campaign.group_id)
            }
            None => draft.group_id,
        };

        if let Some(group_id) = group_id {
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            if db.is_member_banned(group_id, author)? {
                return Err(DomainError::not_allowed("banned from this group"));
            }
            db.get_group(group_id)?;
            let membership = db.get_membership(group_id, author)?;
            if !policy::can_post_in_group(membership.as_ref()) {
                return Err(DomainError::not_allowed("only accepted members may post"));
            }
        }

        let prayer = Prayer {
            id: PrayerId::new(),
            author_id: author,
            group_id,
            corporate_id: draft.corporate_id,
            anon: draft.anon,
            value: draft.value,
            created_at: Utc::now(),
            media: draft.media,
            verses: draft.verses,
        };
        db.create_prayer(&prayer)?;
        Ok(prayer)
    }

    /// Fetch one prayer, policy-checked and anon-redacted.  Deliberately
    /// unfiltered by blocks, so a direct link keeps working.
    pub async fn get_prayer(
        &self,
        viewer: Option<UserId>,
        prayer_id: PrayerId,
    ) -> DomainResult<PrayerView> {
        let db = self.db().await;
        let prayer = require_prayer_visible(&db, viewer, prayer_id)?;
        build_prayer_view(&db, viewer, prayer)
    }

    /// Delete a prayer.  Author or, inside a group, any of its
    /// moderators.  Attached media blobs are deleted best-effort.
    pub async fn delete_prayer(&self, actor: UserId, prayer_id: PrayerId) -> DomainResult<()> {
        let media = {
            let mut db = self.db().await;
            let prayer = db.get_prayer(prayer_id)?;
            if let Some(group_id) = prayer.group_id {
                if db.is_group_banned(group_id)? {
                    return Err(DomainError::GroupBanned);
                }
            }
            let allowed = prayer.author_id == actor
                || match prayer.group_id {
                    Some(group_id) => {
                        policy::can_moderate(db.get_membership(group_id, actor)?.as_ref())
                    }
                    None => false,
                };
            if !allowed {
                return Err(DomainError::not_allowed(
                    "only the author or a group moderator may delete a prayer",
                ));
            }
            db.delete_prayer(prayer_id)?;
            prayer.media
        };

        for path in media {
            if let Err(e) = self.blobs().delete(&path).await {
                debug!(path = %path, error = %e, "orphaned media blob not deleted");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Prays
    // ------------------------------------------------------------------

    /// Record a pray.  Within the per-(user, prayer) cooldown window the
    /// call soft-fails to `Ok(false)`; praying on one's own prayer is
    /// recorded but not notified.
    pub async fn pray(
        &self,
        actor: UserId,
        prayer_id: PrayerId,
        value: Option<String>,
    ) -> DomainResult<bool> {
        let now = Utc::now();
        let prayer = {
            let db = self.db().await;
            let prayer = require_prayer_visible(&db, Some(actor), prayer_id)?;
            if let Some(last) = db.latest_pray_at(prayer_id, actor)? {
                if now - last < Duration::seconds(self.config().pray_cooldown_secs) {
                    debug!(prayer_id = %prayer_id, user_id = %actor, "pray within cooldown");
                    return Ok(false);
                }
            }
            db.insert_pray(&PrayerPray {
                id: PrayId::new(),
                prayer_id,
                user_id: actor,
                value,
                created_at: now,
            })?;
            prayer
        };

        if prayer.author_id != actor {
            // The payload names the prayer, never the one who prayed.
            self.dispatch_notification(
                prayer.author_id,
                "Someone prayed with you",
                "Your prayer was prayed for",
                json!({ "prayer_id": prayer_id }),
            )
            .await;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Pinning
    // ------------------------------------------------------------------

    /// Pin a prayer to the top of its group listing.  Moderator only; a
    /// group holds at most one pin, so pinning replaces the previous one.
    pub async fn pin_group_prayer(
        &self,
        actor: UserId,
        group_id: GroupId,
        prayer_id: PrayerId,
    ) -> DomainResult<()> {
        let db = self.db().await;
        if db.is_group_banned(group_id)? {
            return Err(DomainError::GroupBanned);
        }
        let membership = db.get_membership(group_id, actor)?;
        if !policy::can_moderate(membership.as_ref()) {
            return Err(DomainError::not_allowed("only moderators may pin"));
        }
        let prayer = db.get_prayer(prayer_id)?;
        if prayer.group_id != Some(group_id) {
            return Err(DomainError::InvalidParameters(
                "prayer does not belong to this group".to_string(),
            ));
        }
        db.set_pinned_prayer(group_id, prayer_id, Utc::now())?;
        Ok(())
    }

    /// Clear the group's pin.  Returns `false` when nothing was pinned.
    pub async fn unpin_group_prayer(&self, actor: UserId, group_id: GroupId) -> DomainResult<bool> {
        let db = self.db().await;
        let membership = db.get_membership(group_id, actor)?;
        if !policy::can_moderate(membership.as_ref()) {
            return Err(DomainError::not_allowed("only moderators may unpin"));
        }
        db.clear_pinned_prayer(group_id).map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Corporate campaigns
    // ------------------------------------------------------------------

    /// Create a campaign.  Moderator only; `ended_at` may not precede
    /// `started_at`.
    pub async fn create_corporate(
        &self,
        actor: UserId,
        draft: CorporateDraft,
    ) -> DomainResult<CorporatePrayer> {
        if draft.title.trim().is_empty() {
            return Err(DomainError::InvalidParameters("campaign title is empty".to_string()));
        }
        validate_window(draft.started_at, draft.ended_at)?;
        let reminder = draft
            .reminder
            .as_ref()
            .map(|r| r.validate().map(|()| r.build()))
            .transpose()?;

        let campaign = CorporatePrayer {
            id: CorporateId::new(),
            group_id: draft.group_id,
            author_id: actor,
            title: draft.title,
            description: draft.description,
            started_at: draft.started_at,
            ended_at: draft.ended_at,
            reminder_id: reminder.as_ref().map(|r| r.id),
            created_at: Utc::now(),
        };

        let mut db = self.db().await;
        if db.is_group_banned(draft.group_id)? {
            return Err(DomainError::GroupBanned);
        }
        db.get_group(draft.group_id)?;
        let membership = db.get_membership(draft.group_id, actor)?;
        if !policy::can_moderate(membership.as_ref()) {
            return Err(DomainError::not_allowed("only moderators may run campaigns"));
        }
        db.create_corporate(&campaign, reminder.as_ref())?;
        Ok(campaign)
    }

    /// Update a campaign's window and copy.  Moderator of its group.
    pub async fn update_corporate(
        &self,
        actor: UserId,
        corporate_id: CorporateId,
        update: CorporateUpdate,
    ) -> DomainResult<CorporatePrayer> {
        if update.title.trim().is_empty() {
            return Err(DomainError::InvalidParameters("campaign title is empty".to_string()));
        }
        validate_window(update.started_at, update.ended_at)?;

        let db = self.db().await;
        let current = db.get_corporate(corporate_id)?;
        if db.is_group_banned(current.group_id)? {
            return Err(DomainError::GroupBanned);
        }
        let membership = db.get_membership(current.group_id, actor)?;
        if !policy::can_moderate(membership.as_ref()) {
            return Err(DomainError::not_allowed("only moderators may edit campaigns"));
        }

        let updated = CorporatePrayer {
            title: update.title,
            description: update.description,
            started_at: update.started_at,
            ended_at: update.ended_at,
            ..current
        };
        db.update_corporate(&updated)?;
        Ok(updated)
    }

    /// Delete a campaign.  Its prayers are detached back into the group
    /// listing, not deleted.
    pub async fn delete_corporate(
        &self,
        actor: UserId,
        corporate_id: CorporateId,
    ) -> DomainResult<()> {
        let mut db = self.db().await;
        let campaign = db.get_corporate(corporate_id)?;
        if db.is_group_banned(campaign.group_id)? {
            return Err(DomainError::GroupBanned);
        }
        let membership = db.get_membership(campaign.group_id, actor)?;
        if !policy::can_moderate(membership.as_ref()) {
            return Err(DomainError::not_allowed("only moderators may delete campaigns"));
        }
        db.delete_corporate(corporate_id)?;
        Ok(())
    }
}
