// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Spotify user ID (also used as document ID)
    pub spotify_user_id: String,
    /// Display name, falls back to the user ID
    pub display_name: String,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    /// When user first connected
    pub created_at: String,
    /// Last login timestamp
    pub last_active: String,
}

/// User's OAuth tokens (encrypted in Firestore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTokens {
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the access token expires (ISO 8601)
    pub expires_at: String,
    /// Granted OAuth scopes
    pub scopes: Vec<String>,
}
