//! HTTP API surface.
//!
//! Thin translation layer: handlers parse the request, call one engine
//! operation, and serialize the result.  No domain decision is made
//! here; guards and visibility live in the engine.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, Method};
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing::get, routing::post, routing::put, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use oremus_engine::collaborators::IdentityResolver;
use oremus_engine::groups::GroupDraft;
use oremus_engine::prayers::{CorporateDraft, CorporateUpdate, PrayerDraft};
use oremus_engine::users::{ProfileUpdate, UserDraft, UserProfile};
use oremus_engine::Engine;
use oremus_shared::{
    CorporateId, CorporatePrayer, Group, GroupId, GroupMember, Invitation, Membership,
    Notification, Page, Prayer, PrayerId, PrayerPray, PrayerView, User, UserId,
};
use oremus_store::{FeedMode, MemberFilter};

use crate::auth::{self, Viewer};
use crate::blob_store::LocalBlobStore;
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub resolver: Arc<dyn IdentityResolver>,
    pub blobs: Arc<LocalBlobStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Accounts and profiles
        .route("/users", post(user_create))
        .route("/users/me", put(profile_update))
        .route("/users/:id", get(profile_get))
        .route("/users/:id/prayers", get(user_prayers))
        .route("/users/:id/follow", post(follow_user).delete(unfollow_user))
        .route("/users/:id/block", post(block_user).delete(unblock_user))
        // Feeds
        .route("/feed", get(feed))
        // Groups
        .route("/groups", post(group_create).get(group_list))
        .route(
            "/groups/:id",
            get(group_get).put(group_update).delete(group_delete),
        )
        .route("/groups/:id/join", post(group_join))
        .route("/groups/:id/leave", post(group_leave))
        .route("/groups/:id/members", get(member_list))
        .route("/groups/:id/members/:user_id", axum::routing::delete(member_kick))
        .route("/groups/:id/members/:user_id/accept", post(member_accept))
        .route("/groups/:id/members/:user_id/moderator", put(member_moderator))
        .route("/groups/:id/members/:user_id/ban", put(member_ban))
        .route(
            "/groups/:id/invitations/:user_id",
            post(invitation_create).delete(invitation_revoke),
        )
        .route("/invitations", get(invitation_list))
        .route("/groups/:id/prayers", get(group_prayers))
        .route("/groups/:id/corporate", get(corporate_list))
        .route("/groups/:id/pin", put(pin_set).delete(pin_clear))
        // Prayers
        .route("/prayers", post(prayer_create))
        .route("/prayers/:id", get(prayer_get).delete(prayer_delete))
        .route("/prayers/:id/pray", post(prayer_pray))
        .route("/prayers/:id/prays", get(pray_list))
        // Corporate prayer campaigns
        .route("/corporate", post(corporate_create))
        .route(
            "/corporate/:id",
            put(corporate_update).delete(corporate_delete),
        )
        // Notifications
        .route("/notifications", get(notification_list))
        // Media blobs
        .route("/blobs", post(blob_upload))
        .route("/blobs/:name", get(blob_download))
        .layer(DefaultBodyLimit::max(state.config.max_blob_size + 64 * 1024))
        .layer(middleware::from_fn_with_state(state.clone(), auth::identify))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Accounts and profiles
// ---------------------------------------------------------------------------

async fn user_create(
    State(state): State<AppState>,
    Json(draft): Json<UserDraft>,
) -> Result<Json<User>, ServerError> {
    Ok(Json(state.engine.create_user(draft).await?))
}

async fn profile_update(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(state.engine.update_profile(actor, update).await?))
}

async fn profile_get(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserProfile>, ServerError> {
    Ok(Json(state.engine.profile(viewer.0, user_id).await?))
}

async fn user_prayers(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<UserId>,
    Query(query): Query<CursorQuery>,
) -> Result<Json<Page<PrayerView>>, ServerError> {
    let page = state
        .engine
        .fetch_user_prayers(viewer.0, user_id, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

async fn follow_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.follow(actor, user_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn unfollow_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Removed>, ServerError> {
    let actor = viewer.require()?;
    let removed = state.engine.unfollow(actor, user_id).await?;
    Ok(Json(Removed { removed }))
}

async fn block_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.block(actor, user_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn unblock_user(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Removed>, ServerError> {
    let actor = viewer.require()?;
    let removed = state.engine.unblock(actor, user_id).await?;
    Ok(Json(Removed { removed }))
}

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct FeedQuery {
    mode: Option<String>,
    cursor: Option<String>,
}

fn parse_feed_mode(mode: Option<&str>) -> Result<FeedMode, ServerError> {
    match mode {
        None | Some("home") => Ok(FeedMode::Home),
        Some("followers") => Ok(FeedMode::Followers),
        Some("neighbor") => Ok(FeedMode::Neighbor),
        Some(other) => Err(ServerError::BadRequest(format!("unknown feed mode '{other}'"))),
    }
}

async fn feed(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Page<PrayerView>>, ServerError> {
    let mode = parse_feed_mode(query.mode.as_deref())?;
    let page = state
        .engine
        .fetch_feed(viewer.0, mode, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

async fn group_create(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(draft): Json<GroupDraft>,
) -> Result<Json<Group>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(state.engine.create_group(actor, draft).await?))
}

#[derive(Deserialize)]
struct GroupListQuery {
    search: Option<String>,
    /// When true, restrict to groups the caller belongs to.
    mine: Option<bool>,
    cursor: Option<String>,
}

async fn group_list(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<GroupListQuery>,
) -> Result<Json<Page<Group>>, ServerError> {
    let member_of = if query.mine.unwrap_or(false) {
        Some(viewer.require()?)
    } else {
        None
    };
    let page = state
        .engine
        .fetch_groups(
            viewer.0,
            query.search.as_deref(),
            member_of,
            query.cursor.as_deref(),
        )
        .await?;
    Ok(Json(page))
}

async fn group_get(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Group>, ServerError> {
    Ok(Json(state.engine.get_group(viewer.0, group_id).await?))
}

async fn group_update(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
    Json(draft): Json<GroupDraft>,
) -> Result<Json<Group>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(state.engine.update_group(actor, group_id, draft).await?))
}

async fn group_delete(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.delete_group(actor, group_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn group_join(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Membership>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(state.engine.join_group(actor, group_id).await?))
}

async fn group_leave(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.leave_group(actor, group_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

#[derive(Deserialize)]
struct MemberListQuery {
    /// When true, list pending join requests instead of members.
    requests: Option<bool>,
    moderator: Option<bool>,
    banned: Option<bool>,
    cursor: Option<String>,
}

async fn member_list(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
    Query(query): Query<MemberListQuery>,
) -> Result<Json<Page<GroupMember>>, ServerError> {
    let filter = MemberFilter {
        requests: query.requests.unwrap_or(false),
        moderator: query.moderator,
        banned: query.banned,
    };
    let page = state
        .engine
        .fetch_members(viewer.0, group_id, filter, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

async fn member_kick(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.kick_member(actor, group_id, user_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn member_accept(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> Result<Json<Accepted>, ServerError> {
    let actor = viewer.require()?;
    let accepted = state.engine.accept_request(actor, group_id, user_id).await?;
    Ok(Json(Accepted { accepted }))
}

#[derive(Deserialize)]
struct ToggleRequest {
    on: bool,
}

async fn member_moderator(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
    Json(toggle): Json<ToggleRequest>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state
        .engine
        .set_moderator(actor, group_id, user_id, toggle.on)
        .await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn member_ban(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
    Json(toggle): Json<ToggleRequest>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state
        .engine
        .ban_member(actor, group_id, user_id, toggle.on)
        .await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn invitation_create(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.invite_member(actor, group_id, user_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn invitation_revoke(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> Result<Json<Removed>, ServerError> {
    let actor = viewer.require()?;
    let removed = state
        .engine
        .revoke_invitation(actor, group_id, user_id)
        .await?;
    Ok(Json(Removed { removed }))
}

async fn invitation_list(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<Vec<Invitation>>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(state.engine.list_invitations(actor).await?))
}

#[derive(Deserialize)]
struct GroupPrayersQuery {
    /// Restrict to prayers attached to one campaign.
    corporate: Option<CorporateId>,
    cursor: Option<String>,
}

async fn group_prayers(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
    Query(query): Query<GroupPrayersQuery>,
) -> Result<Json<Page<PrayerView>>, ServerError> {
    let page = state
        .engine
        .fetch_group_prayers(viewer.0, group_id, query.corporate, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

#[derive(Deserialize)]
struct CorporateListQuery {
    /// Client timezone offset in minutes, applied to the urgency clock.
    minutes_offset: Option<i64>,
    cursor: Option<String>,
}

async fn corporate_list(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
    Query(query): Query<CorporateListQuery>,
) -> Result<Json<Page<CorporatePrayer>>, ServerError> {
    let page = state
        .engine
        .fetch_corporate_prayers(
            viewer.0,
            group_id,
            query.minutes_offset.unwrap_or(0),
            query.cursor.as_deref(),
        )
        .await?;
    Ok(Json(page))
}

#[derive(Deserialize)]
struct PinRequest {
    prayer_id: PrayerId,
}

async fn pin_set(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
    Json(request): Json<PinRequest>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state
        .engine
        .pin_group_prayer(actor, group_id, request.prayer_id)
        .await?;
    Ok(Json(Acknowledged { ok: true }))
}

async fn pin_clear(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Removed>, ServerError> {
    let actor = viewer.require()?;
    let removed = state.engine.unpin_group_prayer(actor, group_id).await?;
    Ok(Json(Removed { removed }))
}

// ---------------------------------------------------------------------------
// Prayers
// ---------------------------------------------------------------------------

async fn prayer_create(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(draft): Json<PrayerDraft>,
) -> Result<Json<Prayer>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(state.engine.create_prayer(actor, draft).await?))
}

async fn prayer_get(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(prayer_id): Path<PrayerId>,
) -> Result<Json<PrayerView>, ServerError> {
    Ok(Json(state.engine.get_prayer(viewer.0, prayer_id).await?))
}

async fn prayer_delete(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(prayer_id): Path<PrayerId>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.delete_prayer(actor, prayer_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

#[derive(Deserialize, Default)]
struct PrayRequest {
    value: Option<String>,
}

#[derive(Serialize)]
struct PrayResponse {
    /// `false` when the cooldown swallowed the pray.
    recorded: bool,
}

async fn prayer_pray(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(prayer_id): Path<PrayerId>,
    Json(request): Json<PrayRequest>,
) -> Result<Json<PrayResponse>, ServerError> {
    let actor = viewer.require()?;
    let recorded = state.engine.pray(actor, prayer_id, request.value).await?;
    Ok(Json(PrayResponse { recorded }))
}

async fn pray_list(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(prayer_id): Path<PrayerId>,
    Query(query): Query<CursorQuery>,
) -> Result<Json<Page<PrayerPray>>, ServerError> {
    let page = state
        .engine
        .fetch_prays(viewer.0, prayer_id, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

// ---------------------------------------------------------------------------
// Corporate prayer campaigns
// ---------------------------------------------------------------------------

async fn corporate_create(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(draft): Json<CorporateDraft>,
) -> Result<Json<CorporatePrayer>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(state.engine.create_corporate(actor, draft).await?))
}

async fn corporate_update(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(corporate_id): Path<CorporateId>,
    Json(update): Json<CorporateUpdate>,
) -> Result<Json<CorporatePrayer>, ServerError> {
    let actor = viewer.require()?;
    Ok(Json(
        state.engine.update_corporate(actor, corporate_id, update).await?,
    ))
}

async fn corporate_delete(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(corporate_id): Path<CorporateId>,
) -> Result<Json<Acknowledged>, ServerError> {
    let actor = viewer.require()?;
    state.engine.delete_corporate(actor, corporate_id).await?;
    Ok(Json(Acknowledged { ok: true }))
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

async fn notification_list(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<CursorQuery>,
) -> Result<Json<Page<Notification>>, ServerError> {
    let actor = viewer.require()?;
    let page = state
        .engine
        .fetch_notifications(actor, query.cursor.as_deref())
        .await?;
    Ok(Json(page))
}

// ---------------------------------------------------------------------------
// Media blobs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct BlobUploadResponse {
    path: String,
}

async fn blob_upload(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    mut multipart: Multipart,
) -> Result<Json<BlobUploadResponse>, ServerError> {
    viewer.require()?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;

            let path = state.blobs.store_blob(&data).await?;
            return Ok(Json(BlobUploadResponse { path }));
        }
    }
    Err(ServerError::BadRequest("Missing 'file' field".to_string()))
}

async fn blob_download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    let data = state.blobs.get_blob(&name).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Shared request / response shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CursorQuery {
    cursor: Option<String>,
}

#[derive(Serialize)]
struct Acknowledged {
    ok: bool,
}

#[derive(Serialize)]
struct Removed {
    removed: bool,
}

#[derive(Serialize)]
struct Accepted {
    accepted: bool,
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
