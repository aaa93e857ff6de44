//! The group-membership moderation workflow.
//!
//! Every transition runs its guards and its write under one hold of the
//! database lock, so role checks cannot go stale against a concurrent
//! writer.  Eligibility-changing transitions dispatch a best-effort
//! notification after the lock is released; delivery failure never
//! affects the transition result.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use oremus_shared::{policy, DomainError, DomainResult, GroupId, Invitation, Membership, UserId};

use crate::engine::Engine;

impl Engine {
    // ------------------------------------------------------------------
    // Join / leave
    // ------------------------------------------------------------------

    /// Join a group (or request to).  Open groups and invited users are
    /// accepted immediately; otherwise the membership is pending.
    /// Joining a group the user already belongs to returns the existing
    /// membership unchanged.
    pub async fn join_group(&self, user: UserId, group_id: GroupId) -> DomainResult<Membership> {
        let now = Utc::now();
        let (group, membership, username) = {
            let mut db = self.db().await;
            if db.is_user_banned(user)? {
                return Err(DomainError::not_allowed("account is suspended"));
            }
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            if db.is_member_banned(group_id, user)? {
                return Err(DomainError::not_allowed("banned from this group"));
            }
            let group = db.get_group(group_id)?;
            let username = db.get_user(user)?.username;
            let membership = db.upsert_join(group_id, user, now)?;
            (group, membership, username)
        };

        // A row written by this call carries this call's timestamp; an
        // older row means the user was already a member.
        let fresh = membership.requested_at.timestamp_millis() == now.timestamp_millis();
        if fresh && !membership.is_accepted() {
            info!(group_id = %group_id, user_id = %user, "membership requested");
            self.dispatch_notification(
                group.admin_id,
                "New join request",
                &format!("{username} asked to join {}", group.name),
                json!({ "group_id": group_id, "user_id": user }),
            )
            .await;
        }
        Ok(membership)
    }

    /// Leave a group.  The admin cannot leave; they must delete the
    /// group (or the group must be handed off out of band).
    pub async fn leave_group(&self, user: UserId, group_id: GroupId) -> DomainResult<()> {
        let db = self.db().await;
        let group = db.get_group(group_id)?;
        if policy::is_admin(&group, user) {
            return Err(DomainError::not_allowed("the admin cannot leave the group"));
        }
        if !db.remove_membership(group_id, user)? {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Moderator actions
    // ------------------------------------------------------------------

    /// Accept a pending membership request.  The target membership must
    /// exist; returns `false` when it was already accepted.
    pub async fn accept_request(
        &self,
        actor: UserId,
        group_id: GroupId,
        target: UserId,
    ) -> DomainResult<bool> {
        let (group, accepted) = {
            let db = self.db().await;
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            let group = db.get_group(group_id)?;
            let actor_membership = db.get_membership(group_id, actor)?;
            if !policy::can_moderate(actor_membership.as_ref()) {
                return Err(DomainError::not_allowed("only moderators may accept requests"));
            }
            if db.get_membership(group_id, target)?.is_none() {
                return Err(DomainError::NotFound);
            }
            let accepted = db.accept_member(group_id, target, Utc::now())?;
            (group, accepted)
        };

        if accepted {
            info!(group_id = %group_id, user_id = %target, "membership accepted");
            self.dispatch_notification(
                target,
                "Request accepted",
                &format!("You are now a member of {}", group.name),
                json!({ "group_id": group_id }),
            )
            .await;
        }
        Ok(accepted)
    }

    /// Grant or revoke moderator standing.  Admin only; the admin's own
    /// standing is fixed.
    pub async fn set_moderator(
        &self,
        actor: UserId,
        group_id: GroupId,
        target: UserId,
        on: bool,
    ) -> DomainResult<()> {
        let group = {
            let db = self.db().await;
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            let group = db.get_group(group_id)?;
            if !policy::is_admin(&group, actor) {
                return Err(DomainError::not_allowed("only the admin may change moderators"));
            }
            if target == group.admin_id {
                return Err(DomainError::not_allowed("the admin's standing is fixed"));
            }
            let target_membership = db.get_membership(group_id, target)?;
            if !policy::is_accepted(target_membership.as_ref()) {
                return Err(DomainError::not_allowed("target is not an accepted member"));
            }
            db.set_moderator(group_id, target, on, Utc::now())?;
            group
        };

        let (title, body) = if on {
            ("Moderator granted", format!("You are now a moderator of {}", group.name))
        } else {
            ("Moderator removed", format!("Your moderator role in {} was removed", group.name))
        };
        self.dispatch_notification(target, title, &body, json!({ "group_id": group_id }))
            .await;
        Ok(())
    }

    /// Flag a user as banned from the group, or lift the ban.  The ban
    /// is an independent flag: any membership row is left untouched.
    /// Moderators are unbannable until demoted.
    pub async fn ban_member(
        &self,
        actor: UserId,
        group_id: GroupId,
        target: UserId,
        on: bool,
    ) -> DomainResult<()> {
        let group = {
            let db = self.db().await;
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            let group = db.get_group(group_id)?;
            let actor_membership = db.get_membership(group_id, actor)?;
            if !policy::can_moderate(actor_membership.as_ref()) {
                return Err(DomainError::not_allowed("only moderators may ban"));
            }
            if target == actor {
                return Err(DomainError::not_allowed("cannot target yourself"));
            }
            if target == group.admin_id {
                return Err(DomainError::not_allowed("the admin cannot be banned"));
            }
            if on {
                let target_membership = db.get_membership(group_id, target)?;
                if policy::can_moderate(target_membership.as_ref()) {
                    return Err(DomainError::not_allowed("demote a moderator before banning"));
                }
            }
            db.set_member_ban(group_id, target, on, Utc::now())?;
            group
        };

        let (title, body) = if on {
            ("Banned from group", format!("You were banned from {}", group.name))
        } else {
            ("Ban lifted", format!("You may join {} again", group.name))
        };
        info!(group_id = %group_id, user_id = %target, banned = on, "member ban updated");
        self.dispatch_notification(target, title, &body, json!({ "group_id": group_id }))
            .await;
        Ok(())
    }

    /// Remove a member without banning.  Never targets self, moderators,
    /// or the admin.
    pub async fn kick_member(
        &self,
        actor: UserId,
        group_id: GroupId,
        target: UserId,
    ) -> DomainResult<()> {
        let group = {
            let db = self.db().await;
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            let group = db.get_group(group_id)?;
            let actor_membership = db.get_membership(group_id, actor)?;
            if !policy::can_moderate(actor_membership.as_ref()) {
                return Err(DomainError::not_allowed("only moderators may remove members"));
            }
            if target == actor {
                return Err(DomainError::not_allowed("cannot target yourself"));
            }
            if target == group.admin_id {
                return Err(DomainError::not_allowed("the admin cannot be removed"));
            }
            let target_membership = db.get_membership(group_id, target)?;
            if policy::can_moderate(target_membership.as_ref()) {
                return Err(DomainError::not_allowed("demote a moderator before removing them"));
            }
            if !db.remove_membership(group_id, target)? {
                return Err(DomainError::NotFound);
            }
            group
        };

        self.dispatch_notification(
            target,
            "Removed from group",
            &format!("You were removed from {}", group.name),
            json!({ "group_id": group_id }),
        )
        .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Invitations
    // ------------------------------------------------------------------

    /// Invite a user.  The invitation auto-accepts their next join.
    /// Re-inviting is a no-op.
    pub async fn invite_member(
        &self,
        actor: UserId,
        group_id: GroupId,
        target: UserId,
    ) -> DomainResult<()> {
        let group = {
            let db = self.db().await;
            if db.is_group_banned(group_id)? {
                return Err(DomainError::GroupBanned);
            }
            let group = db.get_group(group_id)?;
            let actor_membership = db.get_membership(group_id, actor)?;
            if !policy::can_moderate(actor_membership.as_ref()) {
                return Err(DomainError::not_allowed("only moderators may invite"));
            }
            db.get_user(target)?;
            let target_membership = db.get_membership(group_id, target)?;
            if policy::is_accepted(target_membership.as_ref()) {
                return Err(DomainError::Conflict("already a member".to_string()));
            }
            db.create_invitation(group_id, target, Utc::now())?;
            group
        };

        self.dispatch_notification(
            target,
            "Group invitation",
            &format!("You were invited to join {}", group.name),
            json!({ "group_id": group_id }),
        )
        .await;
        Ok(())
    }

    /// Revoke an invitation (moderator) or decline it (the invitee).
    /// Returns `false` when no invitation existed.
    pub async fn revoke_invitation(
        &self,
        actor: UserId,
        group_id: GroupId,
        target: UserId,
    ) -> DomainResult<bool> {
        let db = self.db().await;
        if db.is_group_banned(group_id)? {
            return Err(DomainError::GroupBanned);
        }
        if actor != target {
            let actor_membership = db.get_membership(group_id, actor)?;
            if !policy::can_moderate(actor_membership.as_ref()) {
                return Err(DomainError::not_allowed(
                    "only moderators may revoke another user's invitation",
                ));
            }
        }
        db.delete_invitation(group_id, target).map_err(Into::into)
    }

    /// Open invitations addressed to one user, newest first.
    pub async fn list_invitations(&self, user: UserId) -> DomainResult<Vec<Invitation>> {
        let db = self.db().await;
        db.list_invitations_for_user(user).map_err(Into::into)
    }
}
