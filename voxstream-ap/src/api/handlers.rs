//! HTTP request handlers
//!
//! Session control endpoints. Mutating endpoints create the owner's session
//! on first use; read-only ones report 404 for unknown owners.

use crate::api::server::AppContext;
use crate::delivery::udp::PeerInfo;
use crate::error::Error;
use crate::playback::{PlaybackSession, SessionSettings, SessionStatus, SettingsUpdate};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use voxstream_common::{OwnerId, RecipientId};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_profile: String,
    built_at: String,
    sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub track: String,
    /// Insert position; omitted or -1 appends
    #[serde(default = "append_position")]
    pub position: i32,
}

fn append_position() -> i32 {
    -1
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    /// Playlist index to start at (default 0)
    pub index: Option<i32>,
    /// Play this track directly without touching the playlist
    pub track: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StopRequest {
    /// Also empty the playlist
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Deserialize)]
pub struct PeerRequest {
    pub addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    pub ready: bool,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = std::result::Result<T, ApiError>;

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::InvalidInput(_) | Error::OutOfRange { .. } | Error::EmptySelection(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

fn session(ctx: &AppContext, owner: OwnerId) -> ApiResult<Arc<PlaybackSession>> {
    ctx.manager.get(owner).map_err(api_error)
}

fn existing_session(ctx: &AppContext, owner: OwnerId) -> ApiResult<Arc<PlaybackSession>> {
    ctx.manager
        .find(owner)
        .ok_or_else(|| api_error(Error::NotFound(format!("session {}", owner))))
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "voxstream-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("VOXSTREAM_GIT_HASH").to_string(),
        build_profile: env!("VOXSTREAM_BUILD_PROFILE").to_string(),
        built_at: env!("VOXSTREAM_BUILD_TIMESTAMP").to_string(),
        sessions: ctx.manager.len(),
    })
}

// ============================================================================
// Session Endpoints
// ============================================================================

/// GET /sessions
pub async fn list_sessions(State(ctx): State<AppContext>) -> Json<Vec<SessionStatus>> {
    let statuses = ctx
        .manager
        .owners()
        .into_iter()
        .filter_map(|owner| ctx.manager.find(owner))
        .map(|session| session.status())
        .collect();
    Json(statuses)
}

/// GET /sessions/:owner
pub async fn get_session(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
) -> ApiResult<Json<SessionStatus>> {
    Ok(Json(existing_session(&ctx, owner)?.status()))
}

/// DELETE /sessions/:owner
pub async fn remove_session(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
) -> ApiResult<Json<StatusResponse>> {
    existing_session(&ctx, owner)?;
    ctx.manager.remove(owner).map_err(api_error)?;
    Ok(ok())
}

/// POST /sessions/:owner/enqueue
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<Json<Vec<String>>> {
    let session = session(&ctx, owner)?;
    info!(owner = %owner, "Enqueue {} at {}", req.track, req.position);
    session
        .enqueue(req.track, req.position)
        .map_err(api_error)?;
    Ok(Json(session.playlist()))
}

/// POST /sessions/:owner/play
pub async fn play(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
    body: Option<Json<PlayRequest>>,
) -> ApiResult<Json<StatusResponse>> {
    let session = session(&ctx, owner)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    match req.track {
        Some(track) => {
            info!(owner = %owner, "Direct play {}", track);
            session.play_direct(track).map_err(api_error)?;
        }
        None => {
            let index = req.index.unwrap_or(0);
            info!(owner = %owner, "Play from index {}", index);
            session.play(index).map_err(api_error)?;
        }
    }
    Ok(ok())
}

/// POST /sessions/:owner/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
    body: Option<Json<StopRequest>>,
) -> ApiResult<Json<StatusResponse>> {
    let session = existing_session(&ctx, owner)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    session.stop_track(req.clear);
    Ok(ok())
}

/// POST /sessions/:owner/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
) -> ApiResult<Json<StatusResponse>> {
    existing_session(&ctx, owner)?.pause();
    Ok(ok())
}

/// POST /sessions/:owner/resume
pub async fn resume(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
) -> ApiResult<Json<StatusResponse>> {
    existing_session(&ctx, owner)?.resume();
    Ok(ok())
}

/// PUT /sessions/:owner/settings
pub async fn update_settings(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<SessionSettings>> {
    let session = session(&ctx, owner)?;
    let settings = session.update_settings(update).map_err(api_error)?;
    Ok(Json(settings))
}

/// DELETE /sessions/:owner/playlist
pub async fn clear_playlist(
    State(ctx): State<AppContext>,
    Path(owner): Path<OwnerId>,
) -> ApiResult<Json<StatusResponse>> {
    existing_session(&ctx, owner)?.clear_playlist();
    Ok(ok())
}

/// DELETE /sessions/:owner/playlist/:index
pub async fn remove_track(
    State(ctx): State<AppContext>,
    Path((owner, index)): Path<(OwnerId, usize)>,
) -> ApiResult<Json<Vec<String>>> {
    let session = existing_session(&ctx, owner)?;
    let removed = session.remove_at(index).map_err(api_error)?;
    info!(owner = %owner, "Removed {} from playlist", removed);
    Ok(Json(session.playlist()))
}

// ============================================================================
// Recipient Endpoints
// ============================================================================

/// GET /recipients
pub async fn list_recipients(State(ctx): State<AppContext>) -> Json<Vec<PeerInfo>> {
    Json(ctx.audience.peers())
}

/// PUT /recipients/:id
pub async fn add_recipient(
    State(ctx): State<AppContext>,
    Path(id): Path<RecipientId>,
    Json(req): Json<PeerRequest>,
) -> Json<Vec<PeerInfo>> {
    info!("Recipient {} at {}", id, req.addr);
    ctx.audience.add_peer(id, req.addr);
    Json(ctx.audience.peers())
}

/// DELETE /recipients/:id
pub async fn remove_recipient(
    State(ctx): State<AppContext>,
    Path(id): Path<RecipientId>,
) -> ApiResult<Json<StatusResponse>> {
    if !ctx.audience.remove_peer(id) {
        return Err(api_error(Error::NotFound(format!("recipient {}", id))));
    }
    info!("Recipient {} removed", id);
    Ok(ok())
}

/// PUT /recipients/:id/ready
pub async fn set_recipient_ready(
    State(ctx): State<AppContext>,
    Path(id): Path<RecipientId>,
    Json(req): Json<ReadyRequest>,
) -> ApiResult<Json<StatusResponse>> {
    if !ctx.audience.set_ready(id, req.ready) {
        return Err(api_error(Error::NotFound(format!("recipient {}", id))));
    }
    Ok(ok())
}
