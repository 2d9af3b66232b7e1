//! HTTP command surface
//!
//! Exposes the commands and control-panel actions over JSON, plus a session
//! snapshot and an SSE stream of session events.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown control or route parameter (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Missing or wrong bearer token (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Session failure outside the interaction flow (500)
    #[error(transparent)]
    Session(#[from] crate::error::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
