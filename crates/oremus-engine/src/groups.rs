//! Group lifecycle: create, fetch, update, delete.
//!
//! Membership transitions live in [`crate::moderation`]; listing lives
//! in [`crate::feed`].

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use oremus_shared::{
    policy, DomainError, DomainResult, Group, GroupId, MembershipType, Reminder, ReminderId,
    UserId,
};

use crate::engine::Engine;
use crate::feed::require_group_visible;

/// Admin-supplied group fields.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupDraft {
    pub name: String,
    pub description: String,
    pub membership_type: MembershipType,
    pub banner_image: Option<String>,
    pub reminder: Option<ReminderDraft>,
}

/// A weekly reminder schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderDraft {
    /// `HH:MM` wall clock.
    pub time: String,
    /// Comma-separated weekday list.
    pub days: String,
}

impl ReminderDraft {
    pub(crate) fn validate(&self) -> DomainResult<()> {
        let valid_time = matches!(self.time.split_once(':'), Some((h, m))
            if h.parse::<u8>().is_ok_and(|h| h < 24) && m.parse::<u8>().is_ok_and(|m| m < 60));
        if !valid_time {
            return Err(DomainError::InvalidParameters(
                "reminder time must be HH:MM".to_string(),
            ));
        }
        if self.days.is_empty() {
            return Err(DomainError::InvalidParameters(
                "reminder needs at least one day".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn build(&self) -> Reminder {
        Reminder {
            id: ReminderId::new(),
            time: self.time.clone(),
            days: self.days.clone(),
            created_at: Utc::now(),
        }
    }
}

impl Engine {
    /// Create a group.  The creator becomes the admin and receives an
    /// accepted moderator membership in the same transaction.
    pub async fn create_group(&self, actor: UserId, draft: GroupDraft) -> DomainResult<Group> {
        if draft.name.trim().is_empty() {
            return Err(DomainError::InvalidParameters("group name is empty".to_string()));
        }
        let reminder = draft
            .reminder
            .as_ref()
            .map(|r| r.validate().map(|()| r.build()))
            .transpose()?;

        let group = Group {
            id: GroupId::new(),
            name: draft.name,
            description: draft.description,
            membership_type: draft.membership_type,
            admin_id: actor,
            banner_image: draft.banner_image,
            reminder_id: reminder.as_ref().map(|r| r.id),
            created_at: Utc::now(),
        };

        {
            let mut db = self.db().await;
            if db.is_user_banned(actor)? {
                return Err(DomainError::not_allowed("account is suspended"));
            }
            db.get_user(actor)?;
            db.create_group(&group, reminder.as_ref())?;
        }

        info!(group_id = %group.id, admin_id = %actor, "group created");
        Ok(group)
    }

    /// Fetch one group.  Private groups read as absent to non-members.
    pub async fn get_group(&self, viewer: Option<UserId>, group_id: GroupId) -> DomainResult<Group> {
        let db = self.db().await;
        require_group_visible(&db, viewer, group_id)
    }

    /// Update the admin-mutable fields.  A replaced banner image deletes
    /// the old blob best-effort.
    pub async fn update_group(
        &self,
        actor: UserId,
        group_id: GroupId,
        draft: GroupDraft,
    ) -> DomainResult<Group> {
        if draft.name.trim().is_empty() {
            return Err(DomainError::InvalidParameters("group name is empty".to_string()));
        }

        let (updated, old_banner) = {
            let db = self.db().await;
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            let current = db.get_group(group_id)?;
            if !policy::is_admin(&current, actor) {
                return Err(DomainError::not_allowed("only the admin may edit the group"));
            }

            let updated = Group {
                name: draft.name,
                description: draft.description,
                membership_type: draft.membership_type,
                banner_image: draft.banner_image,
                ..current.clone()
            };
            db.update_group(&updated)?;

            let old_banner = (current.banner_image != updated.banner_image)
                .then_some(current.banner_image)
                .flatten();
            (updated, old_banner)
        };

        if let Some(path) = old_banner {
            if let Err(e) = self.blobs().delete(&path).await {
                debug!(path = %path, error = %e, "stale banner blob not deleted");
            }
        }
        Ok(updated)
    }

    /// Delete a group.  Admin only; refused while prayers or campaigns
    /// are still attached.
    pub async fn delete_group(&self, actor: UserId, group_id: GroupId) -> DomainResult<()> {
        let banner = {
            let mut db = self.db().await;
            let group = db.get_group(group_id)?;
            if !policy::is_admin(&group, actor) {
                return Err(DomainError::not_allowed("only the admin may delete the group"));
            }
            db.delete_group(group_id)?;
            group.banner_image
        };

        if let Some(path) = banner {
            if let Err(e) = self.blobs().delete(&path).await {
                debug!(path = %path, error = %e, "group banner blob not deleted");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn draft(name: &str, ty: MembershipType) -> GroupDraft {
        GroupDraft {
            name: name.to_string(),
            description: "a circle".to_string(),
            membership_type: ty,
            banner_image: None,
            reminder: None,
        }
    }

    #[tokio::test]
    async fn creator_becomes_admin_moderator() {
        let engine = testing::engine().await;
        let actor = testing::seed_user(&engine, "actor").await;

        let group = engine
            .create_group(actor, draft("morning circle", MembershipType::Open))
            .await
            .unwrap();
        assert_eq!(group.admin_id, actor);

        let membership = engine
            .db()
            .await
            .get_membership(group.id, actor)
            .unwrap()
            .unwrap();
        assert!(membership.is_accepted());
        assert!(membership.is_moderator());
    }

    #[tokio::test]
    async fn reminder_schedule_is_validated() {
        let engine = testing::engine().await;
        let actor = testing::seed_user(&engine, "actor").await;

        let mut d = draft("with reminder", MembershipType::Open);
        d.reminder = Some(ReminderDraft {
            time: "25:00".to_string(),
            days: "mon".to_string(),
        });
        let err = engine.create_group(actor, d).await.unwrap_err();
        assert_eq!(err.code(), "invalid-parameters");

        let mut d = draft("with reminder", MembershipType::Open);
        d.reminder = Some(ReminderDraft {
            time: "07:30".to_string(),
            days: "mon,thu".to_string(),
        });
        let group = engine.create_group(actor, d).await.unwrap();
        assert!(group.reminder_id.is_some());
    }

    #[tokio::test]
    async fn update_is_admin_only_and_swaps_banner_blob() {
        let engine = testing::engine().await;
        let admin = testing::seed_user(&engine, "admin").await;
        let other = testing::seed_user(&engine, "other").await;

        let mut d = draft("g", MembershipType::Open);
        d.banner_image = Some("blobs/old-banner".to_string());
        let group = engine.create_group(admin, d).await.unwrap();

        let mut update = draft("g renamed", MembershipType::Restricted);
        update.banner_image = Some("blobs/new-banner".to_string());

        let err = engine
            .update_group(other, group.id, update.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "operation-not-allowed");

        let updated = engine.update_group(admin, group.id, update).await.unwrap();
        assert_eq!(updated.name, "g renamed");
        assert_eq!(updated.membership_type, MembershipType::Restricted);
        assert_eq!(updated.admin_id, admin);

        let deleted = engine.blobs.deleted.lock().unwrap();
        assert_eq!(deleted.as_slice(), ["blobs/old-banner"]);
    }

    #[tokio::test]
    async fn delete_refused_while_content_remains() {
        let engine = testing::engine().await;
        let admin = testing::seed_user(&engine, "admin").await;
        let group = engine
            .create_group(admin, draft("g", MembershipType::Open))
            .await
            .unwrap();
        testing::seed_group_prayer(&engine, admin, group.id).await;

        let err = engine.delete_group(admin, group.id).await.unwrap_err();
        assert_eq!(err.code(), "operation-not-allowed");

        // After the content is gone the delete cascades.
        let prayer = engine
            .fetch_group_prayers(Some(admin), group.id, None, None)
            .await
            .unwrap()
            .items
            .remove(0);
        engine.db().await.delete_prayer(prayer.prayer.id).unwrap();
        engine.delete_group(admin, group.id).await.unwrap();

        let err = engine.get_group(Some(admin), group.id).await.unwrap_err();
        assert_eq!(err.code(), "not-found");
    }

    #[tokio::test]
    async fn private_group_fetch_hidden_from_outsiders() {
        let engine = testing::engine().await;
        let admin = testing::seed_user(&engine, "admin").await;
        let outsider = testing::seed_user(&engine, "outsider").await;
        let group = engine
            .create_group(admin, draft("secret", MembershipType::Private))
            .await
            .unwrap();

        let err = engine.get_group(Some(outsider), group.id).await.unwrap_err();
        assert_eq!(err.code(), "not-found");
        let err = engine.get_group(None, group.id).await.unwrap_err();
        assert_eq!(err.code(), "not-found");

        assert!(engine.get_group(Some(admin), group.id).await.is_ok());
    }
}
