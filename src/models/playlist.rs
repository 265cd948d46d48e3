// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Playlist history model.

use serde::{Deserialize, Serialize};

use super::mood::Mood;

/// Inclusive range sent to the recommendations endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange<T> {
    pub min: T,
    pub max: T,
}

/// Target ranges used for one recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRanges {
    pub energy: FeatureRange<f64>,
    pub valence: FeatureRange<f64>,
    pub danceability: FeatureRange<f64>,
    pub acousticness: FeatureRange<f64>,
    pub popularity: FeatureRange<u32>,
}

/// Everything that went into picking a playlist's tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedParams {
    pub mood: Mood,
    /// Genres as selected by the user (or `["pop"]`)
    pub genres: Vec<String>,
    pub limit: u32,
    pub ranges: FeatureRanges,
    pub seed_genres: Vec<String>,
    pub seed_artists: Vec<String>,
}

/// A playlist created through this service (document ID = Spotify playlist ID).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub spotify_playlist_id: String,
    /// Owner's Spotify user ID
    pub spotify_user_id: String,
    pub name: String,
    pub public: bool,
    pub track_uris: Vec<String>,
    /// Absent when the tracks were picked by hand without a preview
    pub seed_params: Option<SeedParams>,
    pub external_url: Option<String>,
    pub created_at: String,
}
