//! HTTP server setup and routing

use super::{auth, handlers, sse};
use crate::error::{Error, Result};
use crate::playback::Session;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub session: Session,
    /// Bearer token; `None` disables the check
    pub token: Option<String>,
}

/// Build the router. `/health` stays public.
pub fn build_router(ctx: AppContext) -> Router {
    let protected = Router::new()
        .route("/commands/play", post(handlers::play))
        .route("/commands/play_next", post(handlers::play_next))
        .route("/commands/stop", post(handlers::stop))
        .route("/commands/skip", post(handlers::skip))
        .route("/commands/leave", post(handlers::leave))
        .route("/commands/clear_queue", post(handlers::clear_queue))
        .route("/commands/queue", get(handlers::queue))
        .route("/controls", get(handlers::control_panel))
        // Literal route registered ahead of the dynamic one
        .route("/controls/skip_to", post(handlers::submit_skip_to))
        .route("/controls/:custom_id", post(handlers::press_control))
        .route("/session", get(handlers::snapshot))
        .route("/events", get(sse::event_stream))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth::require_token));

    let public = Router::new().route("/health", get(handlers::health));

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(ctx)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let auth_enabled = ctx.token.is_some();
    let app = build_router(ctx);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(%addr, auth_enabled, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
