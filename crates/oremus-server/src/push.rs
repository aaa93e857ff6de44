//! Push delivery stub.
//!
//! The hosted deployment plugs a real provider in here; the open-source
//! build logs deliveries so the fan-out path stays exercised end to end.

use async_trait::async_trait;
use tracing::info;

use oremus_engine::collaborators::{DeliveryError, NotificationSink};
use oremus_shared::UserId;

#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(
        &self,
        user_id: UserId,
        title: &str,
        body: &str,
        _data: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        info!(user_id = %user_id, title = %title, body = %body, "push notification");
        Ok(())
    }
}
