//! HTTP server setup and routing
//!
//! Sets up the axum control API: per-owner session control, the UDP peer
//! table and the SSE event stream.

use crate::delivery::UdpAudience;
use crate::error::{Error, Result};
use crate::playback::SessionManager;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub manager: Arc<SessionManager>,
    /// Peer table behind the `/recipients` routes
    pub audience: Arc<UdpAudience>,
}

/// Build the control API router
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/sessions", get(super::handlers::list_sessions))
        .route(
            "/sessions/:owner",
            get(super::handlers::get_session).delete(super::handlers::remove_session),
        )
        .route("/sessions/:owner/enqueue", post(super::handlers::enqueue))
        .route("/sessions/:owner/play", post(super::handlers::play))
        .route("/sessions/:owner/stop", post(super::handlers::stop))
        .route("/sessions/:owner/pause", post(super::handlers::pause))
        .route("/sessions/:owner/resume", post(super::handlers::resume))
        .route("/sessions/:owner/settings", put(super::handlers::update_settings))
        .route("/sessions/:owner/playlist", delete(super::handlers::clear_playlist))
        .route(
            "/sessions/:owner/playlist/:index",
            delete(super::handlers::remove_track),
        )
        .route("/recipients", get(super::handlers::list_recipients))
        .route(
            "/recipients/:id",
            put(super::handlers::add_recipient).delete(super::handlers::remove_recipient),
        )
        .route("/recipients/:id/ready", put(super::handlers::set_recipient_ready))
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the control API until `shutdown` is cancelled
pub async fn run(addr: SocketAddr, ctx: AppContext, shutdown: CancellationToken) -> Result<()> {
    let app = router(ctx);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
