//! Shared test fixtures: an in-memory engine with recording fakes.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use oremus_shared::{
    DomainResult, Group, GroupId, MembershipType, Prayer, PrayerId, User, UserId,
};
use oremus_store::Database;

use crate::collaborators::{BlobStore, DeliveryError, NotificationSink};
use crate::engine::{Engine, EngineConfig};

/// Records every store/delete so tests can assert on blob lifecycle.
#[derive(Default)]
pub struct RecordingBlobStore {
    pub stored: StdMutex<Vec<String>>,
    pub deleted: StdMutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn store(&self, _data: &[u8]) -> DomainResult<String> {
        let path = format!("blobs/{}", uuid::Uuid::new_v4());
        self.stored.lock().unwrap().push(path.clone());
        Ok(path)
    }

    async fn delete(&self, path: &str) -> DomainResult<()> {
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

/// Records push deliveries as `(recipient, title)` pairs.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: StdMutex<Vec<(UserId, String)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(
        &self,
        user_id: UserId,
        title: &str,
        _body: &str,
        _data: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push((user_id, title.to_string()));
        Ok(())
    }
}

pub struct TestEngine {
    pub engine: Engine,
    pub blobs: Arc<RecordingBlobStore>,
    pub sink: Arc<RecordingSink>,
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

pub async fn engine() -> TestEngine {
    engine_with_config(EngineConfig::default()).await
}

pub async fn engine_with_config(config: EngineConfig) -> TestEngine {
    let db = Database::open_in_memory().expect("in-memory database");
    let blobs = Arc::new(RecordingBlobStore::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = Engine::new(
        Arc::new(Mutex::new(db)),
        blobs.clone(),
        sink.clone(),
        config,
    );
    TestEngine {
        engine,
        blobs,
        sink,
    }
}

pub async fn seed_user(engine: &Engine, username: &str) -> UserId {
    let user = User {
        id: UserId::new(),
        username: username.to_string(),
        name: username.to_string(),
        bio: None,
        profile_image: None,
        banner_image: None,
        created_at: Utc::now(),
    };
    engine.db().await.create_user(&user).unwrap();
    user.id
}

pub async fn seed_group(engine: &Engine, admin: UserId, ty: MembershipType) -> GroupId {
    let group = Group {
        id: GroupId::new(),
        name: format!("group-{}", &GroupId::new().to_string()[..8]),
        description: String::new(),
        membership_type: ty,
        admin_id: admin,
        banner_image: None,
        reminder_id: None,
        created_at: Utc::now(),
    };
    engine.db().await.create_group(&group, None).unwrap();
    group.id
}

pub async fn seed_feed_prayer(engine: &Engine, author: UserId, offset_secs: i64) -> PrayerId {
    let prayer = Prayer {
        id: PrayerId::new(),
        author_id: author,
        group_id: None,
        corporate_id: None,
        anon: false,
        value: format!("prayer at +{offset_secs}s"),
        created_at: Utc::now() + Duration::seconds(offset_secs),
        media: vec![],
        verses: vec![],
    };
    engine.db().await.create_prayer(&prayer).unwrap();
    prayer.id
}

pub async fn seed_anon_feed_prayer(engine: &Engine, author: UserId) -> PrayerId {
    let prayer = Prayer {
        id: PrayerId::new(),
        author_id: author,
        group_id: None,
        corporate_id: None,
        anon: true,
        value: "unsigned".to_string(),
        created_at: Utc::now(),
        media: vec![],
        verses: vec![],
    };
    engine.db().await.create_prayer(&prayer).unwrap();
    prayer.id
}

pub async fn seed_group_prayer(engine: &Engine, author: UserId, group: GroupId) -> PrayerId {
    let prayer = Prayer {
        id: PrayerId::new(),
        author_id: author,
        group_id: Some(group),
        corporate_id: None,
        anon: false,
        value: "in group".to_string(),
        created_at: Utc::now(),
        media: vec![],
        verses: vec![],
    };
    engine.db().await.create_prayer(&prayer).unwrap();
    prayer.id
}

/// Titles of the in-app notification rows currently stored for a user,
/// oldest first.
pub async fn notification_titles(engine: &Engine, user: UserId) -> Vec<String> {
    let db = engine.db().await;
    let mut rows = db.list_notifications(user, None, 100).unwrap();
    rows.reverse();
    rows.into_iter().map(|(n, _)| n.title).collect()
}
