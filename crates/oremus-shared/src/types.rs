use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// A user account.
    UserId
);
id_type!(
    /// A prayer group.
    GroupId
);
id_type!(
    /// A single prayer post.
    PrayerId
);
id_type!(
    /// A corporate (time-boxed, group-wide) prayer campaign.
    CorporateId
);
id_type!(
    /// One recorded act of praying for a prayer.
    PrayId
);
id_type!(
    /// A group or campaign reminder.
    ReminderId
);
id_type!(
    /// An in-app notification row.
    NotificationId
);

/// How a group admits new members.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    /// Anyone may join and is accepted immediately.
    Open,
    /// Content is publicly visible but joining requires approval.
    Restricted,
    /// Invisible to non-members; joining requires approval or an invite.
    Private,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipType::Open => "open",
            MembershipType::Restricted => "restricted",
            MembershipType::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(MembershipType::Open),
            "restricted" => Some(MembershipType::Restricted),
            "private" => Some(MembershipType::Private),
            _ => None,
        }
    }
}

impl std::fmt::Display for MembershipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_round_trip() {
        let id = UserId::new();
        let parsed = UserId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn membership_type_round_trip() {
        for ty in [
            MembershipType::Open,
            MembershipType::Restricted,
            MembershipType::Private,
        ] {
            assert_eq!(MembershipType::from_str(ty.as_str()), Some(ty));
        }
        assert_eq!(MembershipType::from_str("secret"), None);
    }
}
