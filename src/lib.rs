// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! MoodMix: Spotify playlists from a mood and a few genres
//!
//! This crate provides the backend API that signs users in with Spotify,
//! picks tracks matching a mood/genre selection and saves them as
//! playlists in the user's Spotify account.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{PlaylistComposer, SpotifyService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub spotify: SpotifyService,
    pub composer: PlaylistComposer,
}
