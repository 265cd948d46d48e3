// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod composer;
pub mod kms;
pub mod spotify;

pub use composer::{CompositionRequest, PlaylistComposer, PlaylistDraft, SeedPlan};
pub use kms::KmsService;
pub use spotify::{OAuthResult, SpotifyClient, SpotifyService};
