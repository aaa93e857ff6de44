//! Visibility policy: pure decision functions.
//!
//! Every function takes already-fetched facts and never trusts
//! client-supplied role claims.  The store's listing predicates encode the
//! same rules in SQL; these functions are the single-item and mutation-path
//! source of truth, and the reference the listing predicates are tested
//! against.

use crate::models::{Group, Membership, Prayer};
use crate::types::{MembershipType, UserId};

/// Whether a membership record grants accepted-member standing.
pub fn is_accepted(membership: Option<&Membership>) -> bool {
    membership.is_some_and(Membership::is_accepted)
}

/// A group is visible unless it is private and the viewer is not an
/// accepted member.
pub fn can_view_group(group: &Group, viewer_membership: Option<&Membership>) -> bool {
    group.membership_type != MembershipType::Private || is_accepted(viewer_membership)
}

/// Whether a prayer is visible to the viewer.
///
/// Visible when the viewer is the author; the prayer is ungrouped; the
/// owning group is open; the viewer is an accepted member; or the viewer has
/// already prayed for it (access is grandfathered once a viewer has
/// interacted, even after losing membership).
pub fn can_view_prayer(
    prayer: &Prayer,
    group: Option<&Group>,
    viewer_id: Option<UserId>,
    viewer_membership: Option<&Membership>,
    viewer_has_prayed: bool,
) -> bool {
    if viewer_id == Some(prayer.author_id) {
        return true;
    }
    let Some(group) = group else {
        // Ungrouped prayers are public.
        return prayer.group_id.is_none();
    };
    group.membership_type == MembershipType::Open
        || is_accepted(viewer_membership)
        || viewer_has_prayed
}

/// Only accepted members may post; a pending or absent membership cannot.
pub fn can_post_in_group(membership: Option<&Membership>) -> bool {
    is_accepted(membership)
}

/// Moderator standing.  The admin is granted a moderator membership row at
/// group creation, so listing paths need only this check; admin-only
/// actions (delete/update group, promote/demote) must use [`is_admin`].
pub fn can_moderate(membership: Option<&Membership>) -> bool {
    membership.is_some_and(Membership::is_moderator)
}

/// Exact admin check for admin-only actions.
pub fn is_admin(group: &Group, user_id: UserId) -> bool {
    group.admin_id == user_id
}

/// Whether the author identity may appear in the returned representation.
///
/// Redaction is applied after all visibility and count computations,
/// never before.
pub fn author_visible(prayer: &Prayer, viewer_id: Option<UserId>) -> bool {
    !prayer.anon || viewer_id == Some(prayer.author_id)
}
