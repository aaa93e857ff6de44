//! Best-effort notification dispatch.
//!
//! The in-app row is written synchronously (so the recipient's
//! notification listing is consistent with the transition that caused
//! it); the external push fan-out runs on a spawned task.  Neither step
//! may affect the outcome of the operation that triggered it.

use chrono::Utc;
use tracing::debug;

use oremus_shared::{Notification, NotificationId, UserId};

use crate::engine::Engine;

impl Engine {
    /// Record and fan out one notification.  Never fails.
    ///
    /// Must not be called while the database lock is held.
    pub(crate) async fn dispatch_notification(
        &self,
        user_id: UserId,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) {
        let notification = Notification {
            id: NotificationId::new(),
            user_id,
            title: title.to_string(),
            body: body.to_string(),
            data,
            created_at: Utc::now(),
        };

        {
            let db = self.db().await;
            if let Err(e) = db.insert_notification(&notification) {
                debug!(user_id = %user_id, error = %e, "failed to record notification");
                return;
            }
        }

        let sink = self.notifier().clone();
        tokio::spawn(async move {
            if let Err(e) = sink
                .deliver(
                    notification.user_id,
                    &notification.title,
                    &notification.body,
                    &notification.data,
                )
                .await
            {
                debug!(user_id = %notification.user_id, error = %e, "push delivery failed");
            }
        });
    }
}
