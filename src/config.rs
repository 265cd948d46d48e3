// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use std::env;

/// Default Spotify Accounts service (OAuth) base URL.
pub const SPOTIFY_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
/// Default Spotify Web API base URL.
pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Spotify OAuth client ID (public)
    pub spotify_client_id: String,
    /// Redirect URI registered with the Spotify app
    pub redirect_uri: String,
    /// Frontend URL users land on after login/logout
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Firestore project. `None` selects the in-memory store.
    pub firestore_project_id: Option<String>,
    /// Full KMS key resource path used for token encryption
    pub kms_key_path: Option<String>,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,

    // --- Secrets ---
    /// Spotify OAuth client secret
    pub spotify_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        if jwt_signing_key.len() < 32 {
            return Err(ConfigError::Invalid(
                "JWT_SIGNING_KEY must be at least 32 bytes".to_string(),
            ));
        }

        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(|v| v.into_bytes())
            .unwrap_or_else(|_| jwt_signing_key.clone());

        Ok(Self {
            spotify_client_id: env::var("SPOTIFY_CLIENT_ID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SPOTIFY_CLIENT_ID"))?,
            redirect_uri: env::var("REDIRECT_URI")
                .map_err(|_| ConfigError::Missing("REDIRECT_URI"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            firestore_project_id: env::var("FIRESTORE_PROJECT_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            kms_key_path: env::var("KMS_KEY_PATH").ok().filter(|v| !v.is_empty()),
            spotify_accounts_url: env::var("SPOTIFY_ACCOUNTS_URL")
                .unwrap_or_else(|_| SPOTIFY_ACCOUNTS_URL.to_string()),
            spotify_api_url: env::var("SPOTIFY_API_URL")
                .unwrap_or_else(|_| SPOTIFY_API_URL.to_string()),

            spotify_client_secret: env::var("SPOTIFY_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SPOTIFY_CLIENT_SECRET"))?,
            jwt_signing_key,
            oauth_state_key,
        })
    }

    /// Config for tests: in-memory store, mock KMS, real Spotify URLs.
    pub fn test_default() -> Self {
        Self {
            spotify_client_id: "test_client_id".to_string(),
            redirect_uri: "http://localhost:8080/auth/spotify/callback".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            firestore_project_id: None,
            kms_key_path: None,
            spotify_accounts_url: SPOTIFY_ACCOUNTS_URL.to_string(),
            spotify_api_url: SPOTIFY_API_URL.to_string(),
            spotify_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
        }
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("SPOTIFY_CLIENT_ID", "test_id");
        env::set_var("SPOTIFY_CLIENT_SECRET", " test_secret\n");
        env::set_var("REDIRECT_URI", "http://localhost:8080/auth/spotify/callback");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!!");
        env::remove_var("OAUTH_STATE_KEY");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.spotify_client_id, "test_id");
        assert_eq!(config.spotify_client_secret, "test_secret");
        assert_eq!(config.port, 8080);
        assert_eq!(config.oauth_state_key, config.jwt_signing_key);
        assert_eq!(config.spotify_api_url, SPOTIFY_API_URL);
    }

    #[test]
    fn test_secure_cookies_follow_frontend_scheme() {
        let mut config = Config::test_default();
        assert!(!config.secure_cookies());

        config.frontend_url = "https://moodmix.example.com".to_string();
        assert!(config.secure_cookies());
    }
}
