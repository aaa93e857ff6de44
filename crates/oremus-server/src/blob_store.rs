//! Local-filesystem media storage.
//!
//! Blobs are written under a single base directory with a random UUID
//! filename; the returned path (just the filename) is what prayer and
//! profile records persist.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use oremus_engine::collaborators::BlobStore;
use oremus_shared::{DomainError, DomainResult};

use crate::error::ServerError;

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    // Canonicalize base; target may not exist yet so normalize manually
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
            _ => {} // RootDir, CurDir, Prefix — skip
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
    max_size: usize,
}

impl LocalBlobStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::BlobStorage(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub async fn store_blob(&self, data: &[u8]) -> Result<String, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty blob".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let name = Uuid::new_v4().to_string();
        let path = self.safe_blob_path(&name)?;

        fs::write(&path, data).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to write blob {}: {}", name, e))
        })?;

        debug!(name = %name, size = data.len(), "Stored blob");
        Ok(name)
    }

    pub async fn get_blob(&self, name: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.safe_blob_path(name)?;

        if !path.exists() {
            return Err(ServerError::Domain(DomainError::NotFound));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to read blob {}: {}", name, e))
        })?;

        debug!(name = %name, size = data.len(), "Retrieved blob");
        Ok(data)
    }

    pub async fn delete_blob(&self, name: &str) -> Result<(), ServerError> {
        let path = self.safe_blob_path(name)?;

        // Removing an already-absent blob is a no-op.
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(name = %name, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::BlobStorage(format!(
                "Failed to delete blob {}: {}",
                name, e
            ))),
        }
    }

    /// Safe blob path that validates against traversal.
    fn safe_blob_path(&self, name: &str) -> Result<PathBuf, ServerError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ServerError::BadRequest(
                "Path traversal detected".to_string(),
            ));
        }
        let raw = self.base_path.join(name);
        ensure_within(&self.base_path, &raw)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, data: &[u8]) -> DomainResult<String> {
        self.store_blob(data)
            .await
            .map_err(|e| DomainError::Internal(e.to_string()))
    }

    async fn delete(&self, path: &str) -> DomainResult<()> {
        self.delete_blob(path)
            .await
            .map_err(|e| DomainError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (LocalBlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _dir) = test_store().await;
        let data = b"prayer-banner-bytes";

        let name = store.store_blob(data).await.unwrap();
        let retrieved = store.get_blob(&name).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = test_store().await;
        let name = store.store_blob(b"delete-me").await.unwrap();

        store.delete_blob(&name).await.unwrap();
        assert!(store.get_blob(&name).await.is_err());
        // Second delete of the same name is not an error.
        store.delete_blob(&name).await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.get_blob("../outside").await.is_err());
        assert!(store.get_blob("a/b").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_blob_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.store_blob(b"").await.is_err());
    }

    #[tokio::test]
    async fn test_size_limit() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf(), 8).await.unwrap();
        assert!(store.store_blob(b"12345678").await.is_ok());
        assert!(store.store_blob(b"123456789").await.is_err());
    }
}
