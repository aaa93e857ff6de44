use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use oremus_store::Database;

use crate::collaborators::{BlobStore, NotificationSink};

/// Tunables with conservative defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum seconds between two prays by the same user on the same
    /// prayer.  Within the window the pray soft-fails (no error).
    pub pray_cooldown_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pray_cooldown_secs: 300,
        }
    }
}

/// The service facade.  One instance per process, cheap to clone.
///
/// All state lives in the shared [`Database`]; the single connection
/// behind the mutex serializes every read-check-write sequence, so guard
/// checks made under the lock cannot interleave with other writers.
#[derive(Clone)]
pub struct Engine {
    db: Arc<Mutex<Database>>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn NotificationSink>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        db: Arc<Mutex<Database>>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            blobs,
            notifier,
            config,
        }
    }

    pub(crate) async fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().await
    }

    pub(crate) fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }
}
