//! Accounts and the social graph.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use oremus_shared::{DomainError, DomainResult, User, UserId};

use crate::engine::Engine;

/// Sign-up fields.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDraft {
    pub username: String,
    pub name: String,
    pub bio: Option<String>,
}

/// Profile edit: full replacement of the mutable fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub banner_image: Option<String>,
}

/// A profile with its social-graph counts.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub follower_count: i64,
    pub following_count: i64,
    /// Whether the viewer follows this user.  `false` for anonymous
    /// viewers and for one's own profile.
    pub viewer_follows: bool,
}

impl Engine {
    /// Register an account.  Usernames are unique; a taken one surfaces
    /// as `Conflict`.
    pub async fn create_user(&self, draft: UserDraft) -> DomainResult<User> {
        let username = draft.username.trim();
        if username.is_empty() {
            return Err(DomainError::InvalidParameters("username is empty".to_string()));
        }

        let user = User {
            id: UserId::new(),
            username: username.to_string(),
            name: draft.name,
            bio: draft.bio,
            profile_image: None,
            banner_image: None,
            created_at: Utc::now(),
        };
        self.db().await.create_user(&user)?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Edit one's own profile.  Replaced images have their old blobs
    /// deleted best-effort.
    pub async fn update_profile(
        &self,
        actor: UserId,
        update: ProfileUpdate,
    ) -> DomainResult<User> {
        let (updated, stale_blobs) = {
            let db = self.db().await;
            let current = db.get_user(actor)?;

            let updated = User {
                name: update.name,
                bio: update.bio,
                profile_image: update.profile_image,
                banner_image: update.banner_image,
                ..current.clone()
            };
            db.update_user(&updated)?;

            let mut stale = Vec::new();
            if current.profile_image != updated.profile_image {
                stale.extend(current.profile_image);
            }
            if current.banner_image != updated.banner_image {
                stale.extend(current.banner_image);
            }
            (updated, stale)
        };

        for path in stale_blobs {
            if let Err(e) = self.blobs().delete(&path).await {
                debug!(path = %path, error = %e, "stale profile blob not deleted");
            }
        }
        Ok(updated)
    }

    /// Fetch a profile with follower / following counts.
    pub async fn profile(
        &self,
        viewer: Option<UserId>,
        user_id: UserId,
    ) -> DomainResult<UserProfile> {
        let db = self.db().await;
        let user = db.get_user(user_id)?;
        let follower_count = db.follower_count(user_id)?;
        let following_count = db.following_count(user_id)?;
        let viewer_follows = match viewer {
            Some(v) if v != user_id => db.is_following(v, user_id)?,
            _ => false,
        };
        Ok(UserProfile {
            user,
            follower_count,
            following_count,
            viewer_follows,
        })
    }

    /// Follow another user.  Idempotent; re-following does not re-notify.
    pub async fn follow(&self, actor: UserId, target: UserId) -> DomainResult<()> {
        if actor == target {
            return Err(DomainError::InvalidParameters("cannot follow yourself".to_string()));
        }
        let (already, username) = {
            let db = self.db().await;
            let username = db.get_user(actor)?.username;
            db.get_user(target)?;
            let already = db.is_following(actor, target)?;
            db.follow(actor, target, Utc::now())?;
            (already, username)
        };

        if !already {
            self.dispatch_notification(
                target,
                "New follower",
                &format!("{username} started following you"),
                json!({ "user_id": actor }),
            )
            .await;
        }
        Ok(())
    }

    /// Stop following.  Returns `false` when there was nothing to remove.
    pub async fn unfollow(&self, actor: UserId, target: UserId) -> DomainResult<bool> {
        let db = self.db().await;
        db.unfollow(actor, target).map_err(Into::into)
    }

    /// Block a user.  Idempotent; also severs the follow edges in both
    /// directions so neither feed resurfaces the other.
    pub async fn block(&self, actor: UserId, target: UserId) -> DomainResult<()> {
        if actor == target {
            return Err(DomainError::InvalidParameters("cannot block yourself".to_string()));
        }
        let db = self.db().await;
        db.get_user(target)?;
        db.block(actor, target, Utc::now())?;
        db.unfollow(actor, target)?;
        db.unfollow(target, actor)?;
        Ok(())
    }

    /// Lift a block.  Returns `false` when no block existed.
    pub async fn unblock(&self, actor: UserId, target: UserId) -> DomainResult<bool> {
        let db = self.db().await;
        db.unblock(actor, target).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let engine = testing::engine().await;
        let draft = UserDraft {
            username: "ruth".to_string(),
            name: "Ruth".to_string(),
            bio: None,
        };
        engine.create_user(draft.clone()).await.unwrap();

        let err = engine.create_user(draft).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn profile_counts_and_viewer_follow_flag() {
        let engine = testing::engine().await;
        let a = testing::seed_user(&engine, "a").await;
        let b = testing::seed_user(&engine, "b").await;
        let c = testing::seed_user(&engine, "c").await;

        engine.follow(a, b).await.unwrap();
        engine.follow(c, b).await.unwrap();
        engine.follow(b, a).await.unwrap();

        let profile = engine.profile(Some(a), b).await.unwrap();
        assert_eq!(profile.follower_count, 2);
        assert_eq!(profile.following_count, 1);
        assert!(profile.viewer_follows);

        let own = engine.profile(Some(b), b).await.unwrap();
        assert!(!own.viewer_follows);
    }

    #[tokio::test]
    async fn follow_notifies_once() {
        let engine = testing::engine().await;
        let a = testing::seed_user(&engine, "a").await;
        let b = testing::seed_user(&engine, "b").await;

        engine.follow(a, b).await.unwrap();
        engine.follow(a, b).await.unwrap();

        let titles = testing::notification_titles(&engine, b).await;
        assert_eq!(titles, vec!["New follower"]);

        let err = engine.follow(a, a).await.unwrap_err();
        assert_eq!(err.code(), "invalid-parameters");
    }

    #[tokio::test]
    async fn block_severs_follow_edges() {
        let engine = testing::engine().await;
        let a = testing::seed_user(&engine, "a").await;
        let b = testing::seed_user(&engine, "b").await;

        engine.follow(a, b).await.unwrap();
        engine.follow(b, a).await.unwrap();
        engine.block(a, b).await.unwrap();

        {
            let db = engine.db().await;
            assert!(!db.is_following(a, b).unwrap());
            assert!(!db.is_following(b, a).unwrap());
            assert!(db.is_blocked_between(a, b).unwrap());
        }

        assert!(engine.unblock(a, b).await.unwrap());
        assert!(!engine.unblock(a, b).await.unwrap());
    }

    #[tokio::test]
    async fn image_replacement_deletes_old_blob() {
        let engine = testing::engine().await;
        let a = testing::seed_user(&engine, "a").await;

        engine
            .update_profile(
                a,
                ProfileUpdate {
                    name: "A".to_string(),
                    bio: None,
                    profile_image: Some("blobs/first".to_string()),
                    banner_image: None,
                },
            )
            .await
            .unwrap();

        let updated = engine
            .update_profile(
                a,
                ProfileUpdate {
                    name: "A".to_string(),
                    bio: Some("hello".to_string()),
                    profile_image: Some("blobs/second".to_string()),
                    banner_image: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.profile_image.as_deref(), Some("blobs/second"));

        let deleted = engine.blobs.deleted.lock().unwrap();
        assert_eq!(deleted.as_slice(), ["blobs/first"]);
    }
}
