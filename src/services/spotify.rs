// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spotify Accounts and Web API client.
//!
//! Handles:
//! - Authorization-code exchange and token refresh
//! - Profile, search and recommendation lookups
//! - Playlist creation
//! - Token lifecycle (cache, per-user refresh lock, encrypted storage)

use crate::config::Config;
use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// OAuth scopes requested at login.
pub const SCOPES: &str =
    "playlist-modify-private playlist-modify-public user-read-email user-read-private";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Market used for all catalog lookups.
const MARKET: &str = "US";

/// Spotify API client.
#[derive(Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    accounts_url: String,
    api_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SpotifyClient {
    /// Create a new Spotify client with OAuth credentials from config.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            accounts_url: config.spotify_accounts_url.trim_end_matches('/').to_string(),
            api_url: config.spotify_api_url.trim_end_matches('/').to_string(),
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// URL of the Spotify consent page for the given OAuth state.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?\
             client_id={}&\
             response_type=code&\
             redirect_uri={}&\
             scope={}&\
             show_dialog=true&\
             state={}",
            self.accounts_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::Upstream(format!("Failed to parse token response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Spotify token request failed");

        // 400 covers invalid_grant (expired/revoked code or refresh token)
        // and redirect_uri mismatches; 401 is a bad client.
        if status.as_u16() == 400 || status.as_u16() == 401 {
            return Err(AppError::Auth(format!("HTTP {}: {}", status, body)));
        }

        Err(AppError::Upstream(format!(
            "Token request failed with status {}",
            status
        )))
    }

    /// Get the current user's profile.
    pub async fn get_me(&self, access_token: &str) -> Result<SpotifyProfile, AppError> {
        self.get_json("/me", access_token, &[]).await
    }

    /// Find the top artist for a genre, if any.
    pub async fn search_artist_for_genre(
        &self,
        access_token: &str,
        genre: &str,
    ) -> Result<Option<String>, AppError> {
        let response: ArtistSearchResponse = self
            .get_json(
                "/search",
                access_token,
                &[
                    ("q", genre_query(genre)),
                    ("type", "artist".to_string()),
                    ("limit", "1".to_string()),
                    ("market", MARKET.to_string()),
                ],
            )
            .await?;

        Ok(response
            .artists
            .items
            .into_iter()
            .next()
            .map(|artist| artist.id))
    }

    /// Get track recommendations for seed and tunable-attribute parameters.
    pub async fn get_recommendations(
        &self,
        access_token: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<SpotifyTrack>, AppError> {
        let response: RecommendationsResponse = self
            .get_json("/recommendations", access_token, params)
            .await?;
        Ok(response.tracks)
    }

    /// Search tracks by genre.
    pub async fn search_tracks_for_genre(
        &self,
        access_token: &str,
        genre: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SpotifyTrack>, AppError> {
        let response: TrackSearchResponse = self
            .get_json(
                "/search",
                access_token,
                &[
                    ("q", genre_query(genre)),
                    ("type", "track".to_string()),
                    ("limit", limit.to_string()),
                    ("market", MARKET.to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;
        Ok(response.tracks.items)
    }

    /// Create a playlist owned by `user_id`.
    pub async fn create_playlist(
        &self,
        access_token: &str,
        user_id: &str,
        request: &CreatePlaylistRequest,
    ) -> Result<SpotifyPlaylist, AppError> {
        let path = format!("/users/{}/playlists", urlencoding::encode(user_id));
        self.post_json(&path, access_token, request).await
    }

    /// Append tracks to a playlist.
    pub async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), AppError> {
        let path = format!("/playlists/{}/tracks", urlencoding::encode(playlist_id));
        let body = serde_json::json!({ "uris": uris });
        let _: SnapshotResponse = self.post_json(&path, access_token, &body).await?;
        Ok(())
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Generic POST request with JSON body and response.
    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        access_token: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let url = response.url().path().to_string();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Spotify rate limit hit (429)");
                return Err(AppError::Upstream(AppError::SPOTIFY_RATE_LIMIT.to_string()));
            }

            // Unauthorized - token revoked or expired early
            if status.as_u16() == 401 {
                return Err(AppError::Auth(format!("{} -> HTTP {}", url, status)));
            }

            return Err(AppError::Upstream(format!(
                "{} -> HTTP {}: {}",
                url, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("JSON parse error: {}", e)))
    }
}

fn genre_query(genre: &str) -> String {
    format!("genre:\"{}\"", genre)
}

/// Token endpoint response (code exchange and refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent on most refresh responses
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    fn scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
    }
}

/// Current user's profile (`GET /me`).
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpotifyArtist {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpotifyImage {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpotifyAlbum {
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

/// Track object as returned by search and recommendations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub album: SpotifyAlbum,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    tracks: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl<T> Default for Paging<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Paging<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct TrackSearchResponse {
    #[serde(default)]
    tracks: Paging<SpotifyTrack>,
}

/// Body for `POST /users/{id}/playlists`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub public: bool,
    pub description: String,
}

/// Playlist object returned on creation.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[allow(dead_code)]
    #[serde(default)]
    snapshot_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// SpotifyService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::Database;
use crate::models::{User, UserTokens};
use crate::services::kms::{self, KmsService};
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (1 minute).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache type, keyed by Spotify user ID.
pub type TokenCache = Arc<DashMap<String, CachedToken>>;

/// Shared refresh locks type, keyed by Spotify user ID.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// High-level Spotify service that manages the token lifecycle.
///
/// Tokens are stored encrypted and cached decrypted in memory. A per-user
/// lock serializes refreshes so a user never has two access tokens minted
/// concurrently.
#[derive(Clone)]
pub struct SpotifyService {
    client: SpotifyClient,
    db: Database,
    kms: KmsService,
    /// In-memory cache of decrypted access tokens (shared across requests).
    token_cache: TokenCache,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
}

impl SpotifyService {
    pub fn new(
        client: SpotifyClient,
        db: Database,
        kms: KmsService,
        token_cache: TokenCache,
        refresh_locks: RefreshLocks,
    ) -> Self {
        Self {
            client,
            db,
            kms,
            token_cache,
            refresh_locks,
        }
    }

    /// The underlying API client.
    pub fn client(&self) -> &SpotifyClient {
        &self.client
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expired) access token for the given user.
    ///
    /// 1. Check in-memory cache (no I/O)
    /// 2. Acquire per-user lock, re-check cache
    /// 3. Load from the store and decrypt the access token
    /// 4. If expired, decrypt refresh token, refresh with Spotify, persist
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String, AppError> {
        if let Some(token) = self.cached_token(user_id) {
            return Ok(token);
        }

        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        if let Some(token) = self.cached_token(user_id) {
            return Ok(token);
        }

        let tokens = self
            .db
            .get_tokens(user_id)
            .await?
            .ok_or_else(|| AppError::Auth(format!("No stored tokens for user {}", user_id)))?;

        let access_token = self
            .kms
            .decrypt(&tokens.access_token_encrypted, user_id.as_bytes())
            .await?;

        let expires_at = parse_utc_rfc3339(&tokens.expires_at).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to parse expiry: {}",
                tokens.expires_at
            ))
        })?;

        if is_fresh(expires_at) {
            self.cache_token(user_id, &access_token, expires_at);
            return Ok(access_token);
        }

        tracing::info!(user_id, "Access token expired, refreshing");

        let refresh_token = self
            .kms
            .decrypt(&tokens.refresh_token_encrypted, user_id.as_bytes())
            .await?;

        let new_tokens = match self.client.refresh_token(&refresh_token).await {
            Ok(t) => t,
            Err(AppError::Auth(msg)) if msg.contains("invalid_grant") => {
                // Another instance may have rotated the refresh token already.
                if let Some(token) = self.reload_if_rotated(user_id, &tokens).await? {
                    return Ok(token);
                }
                return Err(AppError::Auth(msg));
            }
            Err(e) => return Err(e),
        };

        let rotated = new_tokens.refresh_token.is_some();
        let new_refresh = new_tokens
            .refresh_token
            .clone()
            .unwrap_or(refresh_token);
        let scopes = new_tokens.scopes().unwrap_or(tokens.scopes);
        let (sealed, new_expires_at) = self
            .seal_tokens(
                user_id,
                &new_tokens.access_token,
                &new_refresh,
                new_tokens.expires_in,
                scopes,
            )
            .await?;

        // Cached even when the write below fails
        self.cache_token(user_id, &new_tokens.access_token, new_expires_at);

        if let Err(e) = self.db.set_tokens(user_id, &sealed).await {
            if rotated {
                tracing::error!(
                    user_id,
                    error = %e,
                    "Failed to persist rotated refresh token; user must sign in again once the cached token expires"
                );
            }
            return Err(e);
        }

        tracing::info!(user_id, "Token refreshed and cached");
        Ok(new_tokens.access_token)
    }

    fn cached_token(&self, user_id: &str) -> Option<String> {
        self.token_cache
            .get(user_id)
            .filter(|cached| is_fresh(cached.expires_at))
            .map(|cached| cached.access_token.clone())
    }

    fn cache_token(&self, user_id: &str, access_token: &str, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            user_id.to_string(),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }

    /// Re-read tokens after a rejected refresh and use them if they changed.
    async fn reload_if_rotated(
        &self,
        user_id: &str,
        stale: &UserTokens,
    ) -> Result<Option<String>, AppError> {
        let Some(current) = self.db.get_tokens(user_id).await? else {
            return Ok(None);
        };
        if current.refresh_token_encrypted == stale.refresh_token_encrypted {
            return Ok(None);
        }
        let Some(expires_at) = parse_utc_rfc3339(&current.expires_at) else {
            return Ok(None);
        };
        if !is_fresh(expires_at) {
            return Ok(None);
        }

        tracing::info!(user_id, "Refresh token was rotated elsewhere, using stored tokens");
        let access_token = self
            .kms
            .decrypt(&current.access_token_encrypted, user_id.as_bytes())
            .await?;
        self.cache_token(user_id, &access_token, expires_at);
        Ok(Some(access_token))
    }

    /// Encrypt a token pair into its stored form. Returns it with the computed expiry.
    async fn seal_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_in: Option<i64>,
        scopes: Vec<String>,
    ) -> Result<(UserTokens, DateTime<Utc>), AppError> {
        let expires_at =
            Utc::now() + Duration::seconds(expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));

        let (enc_access, enc_refresh) =
            kms::encrypt_tokens(&self.kms, access_token, refresh_token, user_id).await?;

        let tokens = UserTokens {
            access_token_encrypted: enc_access,
            refresh_token_encrypted: enc_refresh,
            expires_at: format_utc_rfc3339(expires_at),
            scopes,
        };
        Ok((tokens, expires_at))
    }

    /// Whether the user has completed OAuth and still has stored tokens.
    pub async fn has_stored_tokens(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self.db.get_tokens(user_id).await?.is_some())
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Handle OAuth callback: exchange code for tokens, store user and tokens.
    ///
    /// Nothing is written until the profile lookup succeeds and the tokens
    /// are encrypted.
    pub async fn handle_oauth_callback(&self, code: &str) -> Result<OAuthResult, AppError> {
        let token_response = self.client.exchange_code(code).await?;

        let refresh_token = token_response
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::Auth("Token exchange returned no refresh token".into()))?;

        let profile = self.client.get_me(&token_response.access_token).await?;
        let user_id = profile.id.clone();
        let display_name = profile
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| user_id.clone());

        let scopes = token_response
            .scopes()
            .unwrap_or_else(|| SCOPES.split(' ').map(str::to_string).collect());

        // Encrypt first; after the user write only the token write can fail
        let (sealed, expires_at) = self
            .seal_tokens(
                &user_id,
                &token_response.access_token,
                &refresh_token,
                token_response.expires_in,
                scopes,
            )
            .await?;

        let now = format_utc_rfc3339(Utc::now());
        let existing = self.db.get_user(&user_id).await?;
        let is_new_user = existing.is_none();

        let user = User {
            spotify_user_id: user_id.clone(),
            display_name: display_name.clone(),
            email: profile.email.clone(),
            created_at: existing
                .map(|u| u.created_at)
                .unwrap_or_else(|| now.clone()),
            last_active: now,
        };
        self.db.upsert_user(&user).await?;

        // Hold the refresh lock so a concurrent request can't refresh with
        // the previous refresh token while we replace it.
        let lock = self
            .refresh_locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        self.db.set_tokens(&user_id, &sealed).await?;
        self.cache_token(&user_id, &token_response.access_token, expires_at);

        tracing::info!(user_id = %user_id, is_new_user, "OAuth callback handled, user and tokens stored");

        Ok(OAuthResult {
            user_id,
            display_name,
            is_new_user,
        })
    }

    /// Delete stored tokens and drop the cached access token.
    ///
    /// Spotify has no revocation endpoint; the grant stays listed in the
    /// user's Spotify account settings until they remove it there.
    pub async fn revoke_local_tokens(&self, user_id: &str) -> Result<bool, AppError> {
        let had_tokens = self.db.get_tokens(user_id).await?.is_some();
        self.db.delete_tokens(user_id).await?;
        self.token_cache.remove(user_id);
        Ok(had_tokens)
    }
}

fn is_fresh(expires_at: DateTime<Utc>) -> bool {
    Utc::now() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < expires_at
}

/// Result of handling OAuth callback.
#[derive(Debug, Clone)]
pub struct OAuthResult {
    pub user_id: String,
    pub display_name: String,
    pub is_new_user: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_contains_oauth_params() {
        let client = SpotifyClient::new(&Config::test_default());
        let url = client.authorize_url("abc123");

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("show_dialog=true"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fspotify%2Fcallback"
        ));
        assert!(url.contains("scope=playlist-modify-private%20playlist-modify-public"));
    }

    #[test]
    fn test_token_response_without_refresh_token() {
        let json = r#"{"access_token":"abc","token_type":"Bearer","expires_in":3600}"#;
        let parsed: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert!(parsed.refresh_token.is_none());
        assert!(parsed.scopes().is_none());
    }

    #[test]
    fn test_track_parses_with_missing_optional_fields() {
        let json = r#"{"id":"1","uri":"spotify:track:1","name":"Song"}"#;
        let track: SpotifyTrack = serde_json::from_str(json).unwrap();
        assert!(track.album.images.is_empty());
        assert!(track.external_urls.spotify.is_none());
    }

    #[test]
    fn test_is_fresh_applies_margin() {
        assert!(is_fresh(Utc::now() + Duration::minutes(10)));
        assert!(!is_fresh(Utc::now() + Duration::seconds(30)));
        assert!(!is_fresh(Utc::now() - Duration::minutes(1)));
    }
}
