//! Bearer-token check for the protected routes
//!
//! Disabled when no token is configured.

use super::{server::AppContext, ApiError};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// Environment variable holding the API token
pub const TOKEN_ENV: &str = "JUKEBOT_API_TOKEN";

/// Read the token once at startup; blank counts as unset
pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn require_token(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = ctx.token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => {
            warn!(path = %request.uri().path(), "Rejected request without valid token");
            Err(ApiError::Unauthorized)
        }
    }
}
