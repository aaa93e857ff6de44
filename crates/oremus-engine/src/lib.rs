//! # oremus-engine
//!
//! Application services over [`oremus_store::Database`]: the feed query
//! engine, the group-membership moderation workflow, prayer / pray /
//! campaign operations, and best-effort notification dispatch.
//!
//! The engine owns no transport concerns.  Identity resolution, blob
//! storage, and push delivery are collaborator traits
//! ([`collaborators`]) supplied by the embedding binary; tests inject
//! recording fakes.

pub mod collaborators;
pub mod feed;
pub mod groups;
pub mod moderation;
pub mod notify;
pub mod prayers;
pub mod users;

mod engine;

pub use engine::{Engine, EngineConfig};

#[cfg(test)]
pub(crate) mod testing;
