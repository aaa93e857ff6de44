//! Domain model structs shared by the store, the service layer, and the
//! HTTP boundary.
//!
//! Every struct derives `Serialize` and `Deserialize` so listing results can
//! be handed straight to the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    CorporateId, GroupId, MembershipType, NotificationId, PrayId, PrayerId, ReminderId, UserId,
};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user account.  Mutable fields are editable only by the owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Unique handle.
    pub username: String,
    pub name: String,
    pub bio: Option<String>,
    /// Blob-store path of the profile image, if any.
    pub profile_image: Option<String>,
    /// Blob-store path of the profile banner, if any.
    pub banner_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A prayer group.  `admin_id` is set at creation and never changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub membership_type: MembershipType,
    pub admin_id: UserId,
    pub banner_image: Option<String>,
    pub reminder_id: Option<ReminderId>,
    pub created_at: DateTime<Utc>,
}

/// A scheduled reminder attached to a group or corporate campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    /// Local wall-clock time, `HH:MM`.
    pub time: String,
    /// Comma-separated weekday list, e.g. `"mon,wed,fri"`.
    pub days: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// The join-state record binding a user to a group.
///
/// `accepted_at = None` is a pending request (or a not-yet-redeemed invite);
/// `moderator_since = None` means no moderator rights.  The group admin
/// always holds an accepted, moderator membership created alongside the
/// group itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub moderator_since: Option<DateTime<Utc>>,
}

impl Membership {
    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }

    pub fn is_moderator(&self) -> bool {
        self.moderator_since.is_some()
    }
}

/// A moderator-issued invitation.  Its presence auto-accepts the invitee's
/// next join.  Deleted on accept or explicit revocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invitation {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Bans
// ---------------------------------------------------------------------------

/// A group-scoped ban of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberBan {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A platform-level sanction of a whole group.  While present, every group
/// mutation is refused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupBan {
    pub group_id: GroupId,
    pub created_at: DateTime<Utc>,
}

/// A platform-level ban of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserBan {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Social graph
// ---------------------------------------------------------------------------

/// Directed follow edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFollow {
    pub follower_id: UserId,
    pub following_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Directed block edge: hides `user_id`'s content from `target_id` and
/// vice versa in listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserBlock {
    pub user_id: UserId,
    pub target_id: UserId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Prayers
// ---------------------------------------------------------------------------

/// A prayer post.  Belongs to at most one of: the author's personal feed
/// (`group_id` and `corporate_id` both `None`), a group, or a corporate
/// campaign (which implies the campaign's group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prayer {
    pub id: PrayerId,
    pub author_id: UserId,
    pub group_id: Option<GroupId>,
    pub corporate_id: Option<CorporateId>,
    /// Anonymous posts have their author identity redacted for every viewer
    /// except the author.
    pub anon: bool,
    pub value: String,
    pub created_at: DateTime<Utc>,
    /// Blob-store paths of attached media.
    pub media: Vec<String>,
    /// Attached bible-verse ids (opaque to this core).
    pub verses: Vec<i64>,
}

/// A prayer joined with its display facts for one viewer.
///
/// `author` is `None` when the prayer is anonymous and the viewer is not
/// the author (redaction happens after all visibility and count work).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrayerView {
    #[serde(flatten)]
    pub prayer: Prayer,
    pub author: Option<User>,
    pub pray_count: i64,
    pub viewer_has_prayed: bool,
    pub pinned: bool,
}

/// One recorded act of praying for a prayer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrayerPray {
    pub id: PrayId,
    pub prayer_id: PrayerId,
    pub user_id: UserId,
    pub value: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A time-boxed, group-wide campaign aggregating prayers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorporatePrayer {
    pub id: CorporateId,
    pub group_id: GroupId,
    pub author_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reminder_id: Option<ReminderId>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Members / notifications
// ---------------------------------------------------------------------------

/// A member-listing row: the user joined with their membership state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMember {
    pub user: User,
    pub membership: Membership,
    pub banned: bool,
}

/// An in-app notification row, written before the push fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One page of a listing: the items plus an opaque resume token.
/// `next_cursor = None` means end of stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}
