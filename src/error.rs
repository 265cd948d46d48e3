// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    /// Spotify rejected an authorization code or refresh token.
    #[error("Spotify authorization failed: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Spotify unreachable or returned an error.
    #[error("Spotify API error: {0}")]
    Upstream(String),

    #[error("No tracks matched: {0}")]
    EmptyResult(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Marker message for Spotify rate limiting.
    pub const SPOTIFY_RATE_LIMIT: &'static str = "Spotify rate limit exceeded";

    /// Returns true if the user must go through the OAuth flow again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, AppError::Auth(_))
    }

    /// Returns true if Spotify asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::Upstream(msg) if msg == Self::SPOTIFY_RATE_LIMIT)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Auth(msg) => {
                tracing::warn!(error = %msg, "Spotify authorization rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "auth_error",
                    Some("Please log in with Spotify again".to_string()),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Upstream(msg) => {
                tracing::error!(error = %msg, "Spotify API error");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    Some("Spotify request failed, please try again later".to_string()),
                )
            }
            AppError::EmptyResult(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "empty_result",
                Some(format!("{}; try another combination", msg)),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
