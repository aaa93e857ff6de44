use oremus_shared::DomainError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A unique constraint rejected the write (e.g. duplicate username).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(&'static str),

    /// Group deletion refused: prayers or campaigns still reference it.
    #[error("Group still has content attached")]
    GroupNotEmpty,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => DomainError::NotFound,
            StoreError::UniqueViolation(what) => DomainError::Conflict(what.to_string()),
            StoreError::GroupNotEmpty => {
                DomainError::OperationNotAllowed("group still has content attached".into())
            }
            other => DomainError::Internal(other.to_string()),
        }
    }
}
