//! # oremus-store
//!
//! SQLite persistence for the Oremus backend.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! aggregate, plus the keyset-paginated listing queries the feed engine
//! composes.  Every multi-row write runs inside a single transaction;
//! group deletion takes an immediate transaction so its content-retention
//! check is race-free against concurrent writers.
//!
//! Listing queries are assembled from the small predicate/ordering value
//! objects in [`query`], each unit-testable on the SQL it emits, instead of
//! per-endpoint string branching.

pub mod bans;
pub mod corporate;
pub mod database;
pub mod groups;
pub mod invitations;
pub mod memberships;
pub mod migrations;
pub mod notifications;
pub mod prayers;
pub mod prays;
pub mod query;
pub mod social;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use memberships::MemberFilter;
pub use prayers::FeedMode;
