// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! MoodMix API Server
//!
//! Signs users in with Spotify and turns mood/genre selections into
//! playlists saved to their Spotify accounts.

use moodmix::{
    config::Config,
    db::Database,
    services::{KmsService, PlaylistComposer, SpotifyClient, SpotifyService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting MoodMix API");

    let db = Database::connect(config.firestore_project_id.as_deref()).await?;

    let kms = init_kms(&config).await?;

    // Shared across all requests within this instance
    let token_cache = Arc::new(dashmap::DashMap::new());
    let refresh_locks = Arc::new(dashmap::DashMap::new());

    let spotify = SpotifyService::new(
        SpotifyClient::new(&config),
        db.clone(),
        kms,
        token_cache,
        refresh_locks,
    );
    let composer = PlaylistComposer::new(spotify.clone(), db.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        spotify,
        composer,
    });

    let app = moodmix::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// KMS for token encryption. Debug builds fall back to a passthrough mock.
async fn init_kms(config: &Config) -> Result<KmsService, Box<dyn std::error::Error>> {
    match config.kms_key_path.as_deref() {
        Some(key_path) => Ok(KmsService::new(key_path).await?),
        #[cfg(debug_assertions)]
        None => {
            tracing::warn!("KMS_KEY_PATH not set, tokens will be stored unencrypted");
            Ok(KmsService::new_mock())
        }
        #[cfg(not(debug_assertions))]
        None => Err("KMS_KEY_PATH is required in release builds".into()),
    }
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("moodmix=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
