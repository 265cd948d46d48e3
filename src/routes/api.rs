// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{PlaylistRecord, SeedParams};
use crate::routes::auth::session_cookie;
use crate::services::composer::{
    sorted_genres, CompositionRequest, PlaylistDraft, Recommendation, SeedPlan,
    DEFAULT_PLAYLIST_NAME,
};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const TRACK_URI_PREFIX: &str = "spotify:track:";

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/genres", get(get_genres))
        .route("/api/recommendations", post(recommend))
        .route("/api/playlists", get(list_playlists).post(create_playlist))
        .route("/api/account", delete(delete_account))
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(e.to_string())
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
pub struct UserResponse {
    pub spotify_user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: String,
    pub last_active: String,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.user_id)))?;

    Ok(Json(UserResponse {
        spotify_user_id: profile.spotify_user_id,
        display_name: profile.display_name,
        email: profile.email,
        created_at: profile.created_at,
        last_active: profile.last_active,
    }))
}

// ─── Genres ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct GenresResponse {
    pub genres: Vec<&'static str>,
}

async fn get_genres() -> Json<GenresResponse> {
    Json(GenresResponse {
        genres: sorted_genres(),
    })
}

// ─── Recommendations ─────────────────────────────────────────

/// Preview tracks for a mood/genre selection without creating anything.
async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CompositionRequest>,
) -> Result<Json<Recommendation>> {
    body.validate().map_err(validation_error)?;

    let plan = SeedPlan::from_request(&body);
    let recommendation = state.composer.recommend(&user.user_id, plan).await?;

    Ok(Json(recommendation))
}

// ─── Playlists ───────────────────────────────────────────────

/// Create-playlist request.
///
/// With `track_uris` the given tracks (usually from a preview) are used as
/// is; without them tracks are picked from the mood/genre fields.
#[derive(Deserialize, Validate)]
pub struct CreatePlaylistBody {
    #[serde(flatten)]
    #[validate(nested)]
    composition: CompositionRequest,
    #[validate(length(min = 1, max = 100))]
    name: Option<String>,
    #[serde(default)]
    public: bool,
    #[validate(length(max = 30))]
    track_uris: Option<Vec<String>>,
    /// Echoed back from a preview so the history records how tracks were picked
    seed_params: Option<SeedParams>,
}

/// Compose and save a playlist to the user's Spotify account.
async fn create_playlist(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreatePlaylistBody>,
) -> Result<(StatusCode, Json<PlaylistRecord>)> {
    body.validate().map_err(validation_error)?;

    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string());

    let record = match body.track_uris {
        Some(track_uris) => {
            if let Some(bad) = track_uris.iter().find(|u| !u.starts_with(TRACK_URI_PREFIX)) {
                return Err(AppError::BadRequest(format!("Not a track URI: {}", bad)));
            }
            let draft = PlaylistDraft {
                name,
                public: body.public,
                track_uris,
                seed_params: body.seed_params,
            };
            state.composer.create_playlist(&user.user_id, draft).await?
        }
        None => {
            let plan = SeedPlan::from_request(&body.composition);
            state
                .composer
                .compose(&user.user_id, plan, name, body.public)
                .await?
        }
    };

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Serialize)]
pub struct PlaylistHistoryResponse {
    pub playlists: Vec<PlaylistRecord>,
}

/// Playlists created through this service, newest first.
async fn list_playlists(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<PlaylistHistoryResponse>> {
    let playlists = state.db.list_playlists_for_user(&user.user_id).await?;
    Ok(Json(PlaylistHistoryResponse { playlists }))
}

// ─── Account Deletion ────────────────────────────────────────

/// Response for account deletion.
#[derive(Serialize)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
}

/// Delete stored tokens, playlist history and the user profile.
///
/// Playlists already saved to Spotify are left alone.
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<DeleteAccountResponse>)> {
    tracing::info!(user_id = %user.user_id, "User-initiated account deletion");

    // Tokens first so no request can act on the account mid-deletion
    state.spotify.revoke_local_tokens(&user.user_id).await?;
    let deleted = state.db.delete_user_data(&user.user_id).await?;

    tracing::info!(user_id = %user.user_id, deleted, "Account deleted");

    let jar = jar.remove(session_cookie(String::new(), &state.config));
    Ok((
        jar,
        Json(DeleteAccountResponse {
            success: true,
            message: "Account deleted. Remove MoodMix from your Spotify apps page to revoke access."
                .to_string(),
        }),
    ))
}
