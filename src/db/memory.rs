// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store with the same operations as [`super::FirestoreDb`].
//!
//! Used when no Firestore project is configured and by the test suite.
//! Contents are lost when the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::AppError;
use crate::models::{PlaylistRecord, User, UserTokens};

#[derive(Default)]
struct Collections {
    users: DashMap<String, User>,
    tokens: DashMap<String, UserTokens>,
    playlists: DashMap<String, PlaylistRecord>,
    fail_writes: AtomicBool,
}

/// In-memory database handle. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Collections>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`AppError::Database`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("write rejected".to_string()));
        }
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.inner.users.get(user_id).map(|u| u.clone()))
    }

    pub fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.check_writable()?;
        self.inner
            .users
            .insert(user.spotify_user_id.clone(), user.clone());
        Ok(())
    }

    pub fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError> {
        Ok(self.inner.tokens.get(user_id).map(|t| t.clone()))
    }

    pub fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        self.check_writable()?;
        self.inner
            .tokens
            .insert(user_id.to_string(), tokens.clone());
        Ok(())
    }

    pub fn delete_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.check_writable()?;
        self.inner.tokens.remove(user_id);
        Ok(())
    }

    pub fn add_playlist(&self, record: &PlaylistRecord) -> Result<(), AppError> {
        self.check_writable()?;
        self.inner
            .playlists
            .insert(record.spotify_playlist_id.clone(), record.clone());
        Ok(())
    }

    pub fn list_playlists_for_user(&self, user_id: &str) -> Result<Vec<PlaylistRecord>, AppError> {
        let mut records: Vec<PlaylistRecord> = self
            .inner
            .playlists
            .iter()
            .filter(|entry| entry.spotify_user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        // RFC3339 with a fixed offset sorts lexicographically; same-second
        // records fall back to the playlist ID
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.spotify_playlist_id.cmp(&a.spotify_playlist_id))
        });
        Ok(records)
    }

    pub fn delete_user_data(&self, user_id: &str) -> Result<usize, AppError> {
        self.check_writable()?;
        let mut deleted = 0;
        self.inner.playlists.retain(|_, record| {
            let owned = record.spotify_user_id == user_id;
            if owned {
                deleted += 1;
            }
            !owned
        });
        if self.inner.users.remove(user_id).is_some() {
            deleted += 1;
        }
        Ok(deleted)
    }
}
