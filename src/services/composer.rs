// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Playlist composition: mood/genre → candidate tracks → Spotify playlist.
//!
//! Planning (feature targets, seeds, random offsets) is synchronous and
//! takes the RNG explicitly; the async half only talks to Spotify and the
//! store.

use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::Database;
use crate::error::AppError;
use crate::models::{FeatureRange, FeatureRanges, Mood, PlaylistRecord, SeedParams};
use crate::services::spotify::{CreatePlaylistRequest, SpotifyService, SpotifyTrack};
use crate::time_utils::format_utc_rfc3339;

/// Hard cap on tracks per playlist.
pub const MAX_TRACKS: u32 = 30;
/// Track count when the request does not specify one.
pub const DEFAULT_TRACKS: u32 = 15;
pub const DEFAULT_PLAYLIST_NAME: &str = "Mood/Genre Mix";
const PLAYLIST_DESCRIPTION: &str = "Created with MoodMix";

/// Random offset applied to each mood center.
const JIGGLE: f64 = 0.08;
/// Half-width of each target range around the (jiggled) center.
const SPAN: f64 = 0.20;
const POPULARITY: FeatureRange<u32> = FeatureRange { min: 40, max: 95 };
const MAX_SEED_GENRES: usize = 3;
const MAX_SEED_ARTISTS: usize = 2;
const FALLBACK_GENRE: &str = "pop";
const FALLBACK_SEARCH_OFFSETS: [u32; 4] = [0, 20, 40, 60];

/// Genres offered to the user.
pub const GENRES: [&str; 29] = [
    "pop",
    "rock",
    "hip-hop",
    "edm",
    "r-n-b",
    "country",
    "latin",
    "indie",
    "jazz",
    "house",
    "dance",
    "electronic",
    "soul",
    "funk",
    "punk",
    "metal",
    "k-pop",
    "afrobeats",
    "reggae",
    "blues",
    "folk",
    "classical",
    "ambient",
    "techno",
    "trance",
    "dubstep",
    "drum-and-bass",
    "grunge",
    "emo",
];

/// Genre list in display order.
pub fn sorted_genres() -> Vec<&'static str> {
    let mut genres = GENRES.to_vec();
    genres.sort_unstable();
    genres
}

/// What the user asked for.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CompositionRequest {
    #[serde(default)]
    pub mood: Mood,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub genres: Vec<String>,
    /// Clamped to `1..=MAX_TRACKS`
    #[serde(default)]
    pub limit: Option<u32>,
    /// Slider overrides on a 0-10 scale
    #[validate(range(min = 0.0, max = 10.0))]
    pub energy10: Option<f64>,
    #[validate(range(min = 0.0, max = 10.0))]
    pub positivity10: Option<f64>,
    #[validate(range(min = 0.0, max = 10.0))]
    pub danceability10: Option<f64>,
}

/// Everything random about a request, decided up front.
#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub params: SeedParams,
    /// Offset used by the search fallback
    pub fallback_offset: u32,
}

impl SeedPlan {
    pub fn new<R: Rng>(request: &CompositionRequest, rng: &mut R) -> Self {
        let limit = request
            .limit
            .unwrap_or(DEFAULT_TRACKS)
            .clamp(1, MAX_TRACKS);

        let mut center = request.mood.center();
        if let Some(v) = request.energy10 {
            center.energy = v / 10.0;
        }
        if let Some(v) = request.positivity10 {
            center.valence = v / 10.0;
        }
        if let Some(v) = request.danceability10 {
            center.danceability = v / 10.0;
        }

        let mut range_around = |x: f64| {
            let c = (x + rng.random_range(-JIGGLE..=JIGGLE)).clamp(0.0, 1.0);
            FeatureRange {
                min: (c - SPAN).max(0.0),
                max: (c + SPAN).min(1.0),
            }
        };
        let ranges = FeatureRanges {
            energy: range_around(center.energy),
            valence: range_around(center.valence),
            danceability: range_around(center.danceability),
            acousticness: range_around(center.acousticness),
            popularity: POPULARITY,
        };

        let mut genres: Vec<String> = request
            .genres
            .iter()
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty())
            .collect();
        if genres.is_empty() {
            genres.push(FALLBACK_GENRE.to_string());
        }
        let seed_genres = genres.iter().take(MAX_SEED_GENRES).cloned().collect();

        let fallback_offset =
            FALLBACK_SEARCH_OFFSETS[rng.random_range(0..FALLBACK_SEARCH_OFFSETS.len())];

        Self {
            params: SeedParams {
                mood: request.mood,
                genres,
                limit,
                ranges,
                seed_genres,
                seed_artists: Vec::new(),
            },
            fallback_offset,
        }
    }

    /// Plan with the thread-local RNG.
    pub fn from_request(request: &CompositionRequest) -> Self {
        Self::new(request, &mut rand::rng())
    }

    /// Query parameters for `GET /recommendations`.
    fn recommendation_query(&self) -> Vec<(&'static str, String)> {
        let p = &self.params;
        let r = &p.ranges;
        let mut query = vec![
            ("limit", p.limit.to_string()),
            ("market", "US".to_string()),
            ("min_energy", format!("{:.3}", r.energy.min)),
            ("max_energy", format!("{:.3}", r.energy.max)),
            ("min_valence", format!("{:.3}", r.valence.min)),
            ("max_valence", format!("{:.3}", r.valence.max)),
            ("min_danceability", format!("{:.3}", r.danceability.min)),
            ("max_danceability", format!("{:.3}", r.danceability.max)),
            ("min_acousticness", format!("{:.3}", r.acousticness.min)),
            ("max_acousticness", format!("{:.3}", r.acousticness.max)),
            ("min_popularity", r.popularity.min.to_string()),
            ("max_popularity", r.popularity.max.to_string()),
            ("seed_genres", p.seed_genres.join(",")),
        ];
        if !p.seed_artists.is_empty() {
            query.push(("seed_artists", p.seed_artists.join(",")));
        }
        query
    }
}

/// Track as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub uri: String,
    pub name: String,
    /// Artist names, comma separated
    pub artists: String,
    pub album_image: Option<String>,
    pub preview_url: Option<String>,
    pub external_url: Option<String>,
}

impl From<SpotifyTrack> for Track {
    fn from(track: SpotifyTrack) -> Self {
        let artists = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        // Prefer the medium (300px) image
        let album_image = track
            .album
            .images
            .get(1)
            .or_else(|| track.album.images.first())
            .map(|img| img.url.clone());

        Self {
            id: track.id,
            uri: track.uri,
            name: track.name,
            artists,
            album_image,
            preview_url: track.preview_url,
            external_url: track.external_urls.spotify,
        }
    }
}

/// Candidate tracks plus the parameters that produced them.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub tracks: Vec<Track>,
    pub seed_params: SeedParams,
}

/// A playlist ready to be created.
#[derive(Debug, Clone)]
pub struct PlaylistDraft {
    pub name: String,
    pub public: bool,
    pub track_uris: Vec<String>,
    pub seed_params: Option<SeedParams>,
}

/// Turns mood/genre selections into Spotify playlists.
#[derive(Clone)]
pub struct PlaylistComposer {
    spotify: SpotifyService,
    db: Database,
}

impl PlaylistComposer {
    pub fn new(spotify: SpotifyService, db: Database) -> Self {
        Self { spotify, db }
    }

    /// Fetch up to `plan.params.limit` candidate tracks.
    pub async fn recommend(
        &self,
        user_id: &str,
        mut plan: SeedPlan,
    ) -> Result<Recommendation, AppError> {
        let token = self.spotify.get_valid_access_token(user_id).await?;
        let client = self.spotify.client();

        plan.params.seed_artists = self
            .pick_seed_artists(&token, &plan.params.seed_genres)
            .await?;

        let tracks = match client
            .get_recommendations(&token, &plan.recommendation_query())
            .await
        {
            Ok(tracks) => tracks,
            // Search would hit the same limit
            Err(e) if e.requires_reauth() || e.is_rate_limited() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Recommendations unavailable, falling back to genre search");
                let genre = plan
                    .params
                    .seed_genres
                    .first()
                    .map(String::as_str)
                    .unwrap_or(FALLBACK_GENRE);
                client
                    .search_tracks_for_genre(&token, genre, plan.params.limit, plan.fallback_offset)
                    .await?
            }
        };

        let tracks: Vec<Track> = tracks
            .into_iter()
            .take(plan.params.limit as usize)
            .map(Track::from)
            .collect();

        if tracks.is_empty() {
            return Err(AppError::EmptyResult(format!(
                "no tracks found for mood '{:?}' and genres {}",
                plan.params.mood,
                plan.params.genres.join(", ")
            )));
        }

        tracing::info!(user_id, count = tracks.len(), "Recommended tracks");

        Ok(Recommendation {
            tracks,
            seed_params: plan.params,
        })
    }

    /// Search one artist per seed genre, skipping genres whose lookup fails.
    async fn pick_seed_artists(
        &self,
        token: &str,
        genres: &[String],
    ) -> Result<Vec<String>, AppError> {
        let mut artists: Vec<String> = Vec::new();
        for genre in genres {
            match self
                .spotify
                .client()
                .search_artist_for_genre(token, genre)
                .await
            {
                Ok(Some(id)) => {
                    if !artists.contains(&id) {
                        artists.push(id);
                    }
                }
                Ok(None) => {}
                Err(e) if e.requires_reauth() => return Err(e),
                Err(e) => {
                    tracing::debug!(genre = %genre, error = %e, "Seed artist lookup failed");
                }
            }
            if artists.len() >= MAX_SEED_ARTISTS {
                break;
            }
        }
        Ok(artists)
    }

    /// Create a playlist with the given tracks and record it.
    ///
    /// An empty track list is rejected before any Spotify call.
    pub async fn create_playlist(
        &self,
        user_id: &str,
        draft: PlaylistDraft,
    ) -> Result<PlaylistRecord, AppError> {
        let mut track_uris = draft.track_uris;
        if track_uris.is_empty() {
            return Err(AppError::EmptyResult("no tracks selected".to_string()));
        }
        track_uris.truncate(MAX_TRACKS as usize);

        let token = self.spotify.get_valid_access_token(user_id).await?;
        let client = self.spotify.client();

        let me = client.get_me(&token).await?;
        let playlist = client
            .create_playlist(
                &token,
                &me.id,
                &CreatePlaylistRequest {
                    name: draft.name.clone(),
                    public: draft.public,
                    description: PLAYLIST_DESCRIPTION.to_string(),
                },
            )
            .await?;
        client.add_tracks(&token, &playlist.id, &track_uris).await?;

        let record = PlaylistRecord {
            spotify_playlist_id: playlist.id,
            spotify_user_id: user_id.to_string(),
            name: draft.name,
            public: draft.public,
            track_uris,
            seed_params: draft.seed_params,
            external_url: playlist.external_urls.spotify,
            created_at: format_utc_rfc3339(chrono::Utc::now()),
        };

        self.db.add_playlist(&record).await.map_err(|e| {
            tracing::error!(
                playlist_id = %record.spotify_playlist_id,
                "Playlist created on Spotify but not recorded"
            );
            e
        })?;

        tracing::info!(
            user_id,
            playlist_id = %record.spotify_playlist_id,
            tracks = record.track_uris.len(),
            "Playlist created"
        );

        Ok(record)
    }

    /// Recommend and create in one step.
    pub async fn compose(
        &self,
        user_id: &str,
        plan: SeedPlan,
        name: String,
        public: bool,
    ) -> Result<PlaylistRecord, AppError> {
        let recommendation = self.recommend(user_id, plan).await?;
        let draft = PlaylistDraft {
            name,
            public,
            track_uris: recommendation
                .tracks
                .into_iter()
                .map(|t| t.uri)
                .collect(),
            seed_params: Some(recommendation.seed_params),
        };
        self.create_playlist(user_id, draft).await
    }
}
