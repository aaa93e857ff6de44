//! Collaborator seams supplied by the embedding binary.
//!
//! The engine treats identity, blob storage, and push delivery as
//! pluggable: the HTTP server wires real implementations, tests wire
//! recording fakes.  None of these traits may influence a domain
//! decision beyond what their return values express.

use async_trait::async_trait;
use thiserror::Error;

use oremus_shared::{DomainResult, UserId};

/// Maps an opaque bearer token to a user id.
///
/// `Ok(None)` means the token does not resolve (anonymous request);
/// errors are reserved for resolver-infrastructure failures.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> DomainResult<Option<UserId>>;
}

/// Content-addressed media storage.  Paths returned by `store` are the
/// values persisted on prayer and profile records.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, data: &[u8]) -> DomainResult<String>;

    /// Deleting an already-absent blob is not an error.
    async fn delete(&self, path: &str) -> DomainResult<()>;
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// External push delivery.  Strictly best-effort: the dispatch path logs
/// failures at `debug` and never propagates them.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        user_id: UserId,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<(), DeliveryError>;
}
