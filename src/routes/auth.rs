// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spotify OAuth authentication routes.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, session_token, verify_jwt, SESSION_COOKIE};
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a login attempt may take before its state is rejected.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/spotify", get(auth_start))
        .route("/auth/spotify/callback", get(auth_callback))
        .route("/auth/logout", get(logout).post(logout))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// Must live under FRONTEND_URL; anything else is ignored.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to Spotify authorization.
///
/// A returning user with a valid session and stored tokens goes straight
/// back to the frontend without seeing the consent page.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Redirect> {
    let frontend_url = match params.redirect_uri {
        Some(url) if is_under_frontend(&url, &state.config.frontend_url) => url,
        Some(url) => {
            tracing::warn!(redirect_uri = %url, "Ignoring redirect_uri outside frontend");
            state.config.frontend_url.clone()
        }
        None => state.config.frontend_url.clone(),
    };

    if let Some(user_id) = session_token(&jar, &headers)
        .and_then(|token| verify_jwt(&token, &state.config.jwt_signing_key))
    {
        if state.spotify.has_stored_tokens(&user_id).await? {
            tracing::info!(user_id = %user_id, "Returning user, skipping Spotify consent");
            return Ok(Redirect::temporary(&frontend_url));
        }
    }

    let oauth_state = sign_state(&frontend_url, &state.config.oauth_state_key)?;
    let auth_url = state.spotify.client().authorize_url(&oauth_state);

    tracing::info!(
        client_id = %state.config.spotify_client_id,
        frontend_url = %frontend_url,
        "Starting OAuth flow, redirecting to Spotify"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, create session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let frontend_url = params
        .state
        .as_deref()
        .and_then(|s| verify_and_decode_state(s, &state.config.oauth_state_key))
        .unwrap_or_else(|| {
            tracing::warn!(
                "Invalid or tampered state parameter, falling back to default frontend URL"
            );
            state.config.frontend_url.clone()
        });

    // User declined consent or Spotify refused the request
    if let Some(error) = params.error {
        return Err(AppError::Auth(format!("Spotify returned error: {}", error)));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("No code returned".to_string()))?;

    tracing::info!("Exchanging authorization code for tokens");

    let oauth_result = state.spotify.handle_oauth_callback(&code).await?;

    tracing::info!(
        user_id = %oauth_result.user_id,
        display_name = %oauth_result.display_name,
        is_new_user = oauth_result.is_new_user,
        "OAuth successful, user and tokens stored"
    );

    let jwt = create_jwt(&oauth_result.user_id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let jar = jar.add(session_cookie(jwt, &state.config));
    Ok((jar, Redirect::temporary(&frontend_url)))
}

/// Logout - drop the session cookie and return to the frontend.
///
/// Stored tokens are kept so the next login skips the consent page.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    (
        jar.remove(session_cookie(String::new(), &state.config)),
        Redirect::temporary(&state.config.frontend_url),
    )
}

/// Whether `candidate` points at the frontend: same scheme, host and port,
/// no userinfo, and a path at or below the frontend's path.
fn is_under_frontend(candidate: &str, frontend: &str) -> bool {
    let (Ok(candidate), Ok(frontend)) = (Url::parse(candidate), Url::parse(frontend)) else {
        return false;
    };

    if !candidate.username().is_empty() || candidate.password().is_some() {
        return false;
    }

    if candidate.scheme() != frontend.scheme()
        || candidate.host_str() != frontend.host_str()
        || candidate.port_or_known_default() != frontend.port_or_known_default()
    {
        return false;
    }

    let base = frontend.path().trim_end_matches('/');
    let path = candidate.path();
    path == base || path.starts_with(&format!("{}/", base))
}

/// Session cookie with the attributes used for both setting and removal.
pub(crate) fn session_cookie(value: String, config: &Config) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies())
        .build()
}

/// Build the signed OAuth state: base64("frontend_url|timestamp_hex|signature_hex").
fn sign_state(frontend_url: &str, secret: &[u8]) -> Result<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();
    sign_state_at(frontend_url, timestamp, secret)
}

fn sign_state_at(frontend_url: &str, timestamp_ms: u128, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", frontend_url, timestamp_ms);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify HMAC signature and age, then decode the frontend URL from the state.
fn verify_and_decode_state(state: &str, secret: &[u8]) -> Option<String> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_millis();
    verify_and_decode_state_at(state, secret, now)
}

fn verify_and_decode_state_at(state: &str, secret: &[u8], now_ms: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // The URL itself may contain '|', so split from the right
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}", frontend_url, timestamp_hex);
    let signature = hex::decode(signature_hex).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    if mac.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_at = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_at) > STATE_MAX_AGE_MS {
        tracing::warn!("OAuth state expired");
        return None;
    }

    Some(frontend_url.to_string())
}
