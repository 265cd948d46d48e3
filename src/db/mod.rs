// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! [`Database`] is the handle the rest of the app uses. It dispatches to
//! Firestore in production and to an in-process store for local runs and tests.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{PlaylistRecord, User, UserTokens};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TOKENS: &str = "tokens";
    pub const PLAYLISTS: &str = "playlists";
}

/// Storage handle, cheap to clone.
#[derive(Clone)]
pub enum Database {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

impl Database {
    /// Connect to Firestore when a project is configured, otherwise use memory.
    pub async fn connect(project_id: Option<&str>) -> Result<Self, AppError> {
        match project_id {
            Some(project_id) => Ok(Database::Firestore(FirestoreDb::new(project_id).await?)),
            None => {
                tracing::warn!("No Firestore project configured, using in-memory store");
                Ok(Database::Memory(MemoryDb::new()))
            }
        }
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by their Spotify user ID.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        match self {
            Database::Firestore(db) => db.get_user(user_id).await,
            Database::Memory(db) => db.get_user(user_id),
        }
    }

    /// Create or update a user.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        match self {
            Database::Firestore(db) => db.upsert_user(user).await,
            Database::Memory(db) => db.upsert_user(user),
        }
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get encrypted tokens for a user.
    pub async fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError> {
        match self {
            Database::Firestore(db) => db.get_tokens(user_id).await,
            Database::Memory(db) => db.get_tokens(user_id),
        }
    }

    /// Store encrypted tokens for a user.
    pub async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        match self {
            Database::Firestore(db) => db.set_tokens(user_id, tokens).await,
            Database::Memory(db) => db.set_tokens(user_id, tokens),
        }
    }

    /// Delete tokens (logout everywhere / account removal).
    pub async fn delete_tokens(&self, user_id: &str) -> Result<(), AppError> {
        match self {
            Database::Firestore(db) => db.delete_tokens(user_id).await,
            Database::Memory(db) => db.delete_tokens(user_id),
        }
    }

    // ─── Playlist Operations ─────────────────────────────────────

    /// Record a created playlist.
    pub async fn add_playlist(&self, record: &PlaylistRecord) -> Result<(), AppError> {
        match self {
            Database::Firestore(db) => db.add_playlist(record).await,
            Database::Memory(db) => db.add_playlist(record),
        }
    }

    /// Playlist history for a user, newest first.
    pub async fn list_playlists_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PlaylistRecord>, AppError> {
        match self {
            Database::Firestore(db) => db.list_playlists_for_user(user_id).await,
            Database::Memory(db) => db.list_playlists_for_user(user_id),
        }
    }

    /// Delete the user profile and playlist history.
    ///
    /// Tokens are deleted separately by the caller. Returns the number of
    /// documents deleted.
    pub async fn delete_user_data(&self, user_id: &str) -> Result<usize, AppError> {
        match self {
            Database::Firestore(db) => db.delete_user_data(user_id).await,
            Database::Memory(db) => db.delete_user_data(user_id),
        }
    }
}
