//! Bearer-token identification.
//!
//! Every request passes through [`identify`], which resolves the
//! `Authorization` header (when present) into a [`Viewer`] extension.
//! Handlers that require a signed-in caller use [`Viewer::require`];
//! everything else treats `None` as an anonymous read.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::Mutex;

use oremus_engine::collaborators::IdentityResolver;
use oremus_shared::{DomainResult, UserId};
use oremus_store::{Database, StoreError};

use crate::api::AppState;
use crate::error::ServerError;

/// The resolved identity of a request.  `None` means anonymous.
#[derive(Debug, Clone, Copy)]
pub struct Viewer(pub Option<UserId>);

impl Viewer {
    pub fn require(self) -> Result<UserId, ServerError> {
        self.0.ok_or(ServerError::Unauthorized)
    }
}

/// Middleware: resolve the bearer token (if any) and stash the result as
/// a request extension.  An unresolvable token reads as anonymous rather
/// than an error, so stale clients degrade to public views.
pub async fn identify(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let viewer = match token {
        Some(token) => state.resolver.resolve(token).await?,
        None => None,
    };

    request.extensions_mut().insert(Viewer(viewer));
    Ok(next.run(request).await)
}

/// Development resolver: the bearer token is the user's own id.
///
/// The hosted deployment swaps in a real token service behind the same
/// trait; nothing downstream changes.
pub struct TokenIsUserId {
    db: Arc<Mutex<Database>>,
}

impl TokenIsUserId {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityResolver for TokenIsUserId {
    async fn resolve(&self, token: &str) -> DomainResult<Option<UserId>> {
        let Ok(id) = UserId::parse(token) else {
            return Ok(None);
        };
        let db = self.db.lock().await;
        match db.get_user(id) {
            Ok(_) => Ok(Some(id)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
