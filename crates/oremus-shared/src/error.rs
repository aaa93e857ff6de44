use thiserror::Error;

/// Domain error taxonomy.
///
/// Every variant carries a stable machine-readable code (see [`code`]) so
/// the transport layer can map it without string-matching messages.  The two
/// designed soft-fail cases (duplicate join, pray cooldown) are not errors:
/// they surface as non-error `false` results from the operations concerned.
///
/// [`code`]: DomainError::code
#[derive(Error, Debug)]
pub enum DomainError {
    /// The target id does not resolve.
    #[error("Not found")]
    NotFound,

    /// Role or state-machine violation: not a moderator, not the admin,
    /// self-targeting, content retention on delete, and so on.
    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    /// The whole group is under a platform sanction; every group mutation
    /// is refused while the ban is in place.
    #[error("Group is banned")]
    GroupBanned,

    /// Unique-constraint violation surfaced to the caller
    /// (e.g. duplicate username).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed composite input (e.g. end date before start date).
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Pray cooldown.  Only used where the caller explicitly opted out of
    /// the soft-fail contract; listing/mutation paths return `false` instead.
    #[error("Rate limited")]
    RateLimited,

    /// Storage-layer failure that is not a domain condition.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Stable machine-readable code for the transport boundary.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound => "not-found",
            DomainError::OperationNotAllowed(_) => "operation-not-allowed",
            DomainError::GroupBanned => "group-banned",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvalidParameters(_) => "invalid-parameters",
            DomainError::RateLimited => "rate-limited",
            DomainError::Internal(_) => "internal",
        }
    }

    /// Shorthand for the most common guard failure.
    pub fn not_allowed(reason: impl Into<String>) -> Self {
        DomainError::OperationNotAllowed(reason.into())
    }
}

/// Convenience alias used throughout the service layer.
pub type DomainResult<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(DomainError::NotFound.code(), "not-found");
        assert_eq!(DomainError::GroupBanned.code(), "group-banned");
        assert_eq!(
            DomainError::not_allowed("not a moderator").code(),
            "operation-not-allowed"
        );
        assert_eq!(DomainError::RateLimited.code(), "rate-limited");
    }
}
