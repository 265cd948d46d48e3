// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test helpers: a local stand-in for the Spotify Accounts and Web
//! APIs, plus an app wired to it with the in-memory store and mock KMS.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use moodmix::config::Config;
use moodmix::db::{Database, FirestoreDb, MemoryDb};
use moodmix::middleware::auth::{create_jwt, SESSION_COOKIE};
use moodmix::routes::create_router;
use moodmix::services::{KmsService, PlaylistComposer, SpotifyClient, SpotifyService};
use moodmix::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub const GOOD_CODE: &str = "good-code";
#[allow(dead_code)]
pub const ACCESS_1: &str = "access-1";
#[allow(dead_code)]
pub const ACCESS_2: &str = "access-2";
#[allow(dead_code)]
pub const REFRESH_1: &str = "refresh-1";
#[allow(dead_code)]
pub const REFRESH_2: &str = "refresh-2";
#[allow(dead_code)]
pub const USER_ID: &str = "fake-user";
#[allow(dead_code)]
pub const PLAYLIST_ID: &str = "playlist-1";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Track object in the shape Spotify returns.
#[allow(dead_code)]
pub fn track_json(n: usize) -> Value {
    json!({
        "id": format!("t{}", n),
        "uri": format!("spotify:track:t{}", n),
        "name": format!("Track {}", n),
        "artists": [{ "id": "a1", "name": "Artist" }],
        "album": { "images": [] },
        "preview_url": null,
        "external_urls": { "spotify": format!("https://open.spotify.com/track/t{}", n) }
    })
}

/// What the fake Spotify saw and what it will answer.
#[derive(Default)]
pub struct FakeSpotifyState {
    pub calls: Mutex<Vec<String>>,
    pub recommendations: Mutex<Vec<Value>>,
    pub recommendation_queries: Mutex<Vec<HashMap<String, String>>>,
    pub search_tracks: Mutex<Vec<Value>>,
    /// Non-zero makes `/recommendations` answer with this status
    pub recommendations_status: AtomicU16,
    pub refreshes: AtomicUsize,
    /// Refresh responses carry a new refresh token (REFRESH_2)
    pub rotate_refresh_token: AtomicBool,
    /// Runs before a refresh is rejected with invalid_grant
    pub on_rejected_refresh: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    pub created_playlists: Mutex<Vec<Value>>,
    pub added_uris: Mutex<Vec<String>>,
}

impl FakeSpotifyState {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

/// Running fake Spotify server.
pub struct FakeSpotify {
    pub base_url: String,
    pub state: Arc<FakeSpotifyState>,
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    matches!(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ")),
        Some(ACCESS_1) | Some(ACCESS_2)
    )
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "status": 401, "message": "The access token expired" } })),
    )
        .into_response()
}

fn invalid_grant(description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_grant", "error_description": description })),
    )
        .into_response()
}

async fn token(
    State(state): State<Arc<FakeSpotifyState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record("POST /api/token");

    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| h.starts_with("Basic "));
    if !basic {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" })))
            .into_response();
    }

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            if form.get("code").map(String::as_str) != Some(GOOD_CODE) {
                return invalid_grant("Invalid authorization code");
            }
            Json(json!({
                "access_token": ACCESS_1,
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": REFRESH_1,
                "scope": "playlist-modify-private user-read-email"
            }))
            .into_response()
        }
        Some("refresh_token") => {
            if form.get("refresh_token").map(String::as_str) != Some(REFRESH_1) {
                if let Some(hook) = state.on_rejected_refresh.lock().unwrap().as_ref() {
                    hook();
                }
                return invalid_grant("Refresh token revoked");
            }
            state.refreshes.fetch_add(1, Ordering::SeqCst);
            let mut body = json!({
                "access_token": ACCESS_2,
                "token_type": "Bearer",
                "expires_in": 3600
            });
            if state.rotate_refresh_token.load(Ordering::SeqCst) {
                body["refresh_token"] = json!(REFRESH_2);
            }
            Json(body).into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        )
            .into_response(),
    }
}

async fn me(State(state): State<Arc<FakeSpotifyState>>, headers: HeaderMap) -> Response {
    state.record("GET /v1/me");
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": USER_ID,
        "display_name": "Fake User",
        "email": "fake@example.com"
    }))
    .into_response()
}

async fn search(
    State(state): State<Arc<FakeSpotifyState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let kind = query.get("type").cloned().unwrap_or_default();
    state.record(format!("GET /v1/search {}", kind));
    if !bearer_ok(&headers) {
        return unauthorized();
    }

    match kind.as_str() {
        "artist" => {
            let q = query.get("q").cloned().unwrap_or_default();
            Json(json!({
                "artists": { "items": [{ "id": format!("artist-{}", q.len()), "name": "Seed Artist" }] }
            }))
            .into_response()
        }
        _ => {
            let items = state.search_tracks.lock().unwrap().clone();
            Json(json!({ "tracks": { "items": items } })).into_response()
        }
    }
}

async fn recommendations(
    State(state): State<Arc<FakeSpotifyState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record("GET /v1/recommendations");
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    state.recommendation_queries.lock().unwrap().push(query);

    let status = state.recommendations_status.load(Ordering::SeqCst);
    if status != 0 {
        let status = StatusCode::from_u16(status).unwrap();
        return (
            status,
            Json(json!({ "error": { "status": status.as_u16(), "message": "unavailable" } })),
        )
            .into_response();
    }

    let tracks = state.recommendations.lock().unwrap().clone();
    Json(json!({ "tracks": tracks })).into_response()
}

async fn create_playlist(
    State(state): State<Arc<FakeSpotifyState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.record(format!("POST /v1/users/{}/playlists", user_id));
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    state.created_playlists.lock().unwrap().push(body);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": PLAYLIST_ID,
            "external_urls": { "spotify": format!("https://open.spotify.com/playlist/{}", PLAYLIST_ID) }
        })),
    )
        .into_response()
}

async fn add_tracks(
    State(state): State<Arc<FakeSpotifyState>>,
    headers: HeaderMap,
    Path(playlist_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.record(format!("POST /v1/playlists/{}/tracks", playlist_id));
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    let uris: Vec<String> = body["uris"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    state.added_uris.lock().unwrap().extend(uris);
    (StatusCode::CREATED, Json(json!({ "snapshot_id": "snap-1" }))).into_response()
}

/// Start the fake Spotify on an ephemeral port. It recommends 40 tracks.
pub async fn spawn_fake_spotify() -> FakeSpotify {
    let state = Arc::new(FakeSpotifyState::default());
    *state.recommendations.lock().unwrap() = (1..=40).map(track_json).collect();

    let app = Router::new()
        .route("/api/token", post(token))
        .route("/v1/me", get(me))
        .route("/v1/search", get(search))
        .route("/v1/recommendations", get(recommendations))
        .route("/v1/users/{user_id}/playlists", post(create_playlist))
        .route("/v1/playlists/{playlist_id}/tracks", post(add_tracks))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeSpotify {
        base_url: format!("http://{}", addr),
        state,
    }
}

/// App under test, talking to a fake Spotify.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub memory: MemoryDb,
    pub spotify: FakeSpotify,
}

/// Create a test app with the in-memory store, mock KMS and fake Spotify.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    let spotify = spawn_fake_spotify().await;

    let mut config = Config::test_default();
    config.spotify_accounts_url = spotify.base_url.clone();
    config.spotify_api_url = format!("{}/v1", spotify.base_url);

    let memory = MemoryDb::new();
    let db = Database::Memory(memory.clone());

    let spotify_service = SpotifyService::new(
        SpotifyClient::new(&config),
        db.clone(),
        KmsService::new_mock(),
        Arc::new(dashmap::DashMap::new()),
        Arc::new(dashmap::DashMap::new()),
    );
    let composer = PlaylistComposer::new(spotify_service.clone(), db.clone());

    let state = Arc::new(AppState {
        config,
        db,
        spotify: spotify_service,
        composer,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        memory,
        spotify,
    }
}

impl TestApp {
    /// Complete OAuth for the fake user and return a session cookie header value.
    #[allow(dead_code)]
    pub async fn sign_in(&self) -> String {
        let result = self
            .state
            .spotify
            .handle_oauth_callback(GOOD_CODE)
            .await
            .expect("sign in should succeed");
        self.session_cookie_for(&result.user_id)
    }

    /// Session cookie for a user without going through OAuth.
    #[allow(dead_code)]
    pub fn session_cookie_for(&self, user_id: &str) -> String {
        let jwt = create_jwt(user_id, &self.state.config.jwt_signing_key).unwrap();
        format!("{}={}", SESSION_COOKIE, jwt)
    }
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
