// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod mood;
pub mod playlist;
pub mod user;

pub use mood::{FeatureTargets, Mood};
pub use playlist::{FeatureRange, FeatureRanges, PlaylistRecord, SeedParams};
pub use user::{User, UserTokens};
