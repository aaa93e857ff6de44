//! # oremus-shared
//!
//! Pure domain layer for the Oremus backend: typed identifiers, domain
//! models, the error taxonomy, the pagination cursor codec, and the
//! visibility policy.
//!
//! Nothing in this crate performs I/O.  The policy functions operate on
//! already-fetched facts so they can be unit-tested exhaustively and reused
//! identically by the store's listing predicates and the service layer's
//! single-item checks.

pub mod cursor;
pub mod error;
pub mod models;
pub mod policy;
pub mod types;

pub use cursor::{CursorError, CursorKey};
pub use error::{DomainError, DomainResult};
pub use models::*;
pub use types::*;
