// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Moods and the audio-feature targets they map to.

use serde::{Deserialize, Serialize};

/// Mood selected by the user.
///
/// Unknown values (including the empty string) deserialize to [`Mood::Any`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Chill,
    Focus,
    Party,
    #[default]
    #[serde(other)]
    Any,
}

/// Target audio features, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureTargets {
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    pub acousticness: f64,
}

impl Mood {
    /// Center of the audio-feature space for this mood.
    pub fn center(self) -> FeatureTargets {
        let (energy, valence, danceability, acousticness) = match self {
            Mood::Happy => (0.78, 0.85, 0.72, 0.25),
            Mood::Chill => (0.35, 0.55, 0.45, 0.55),
            Mood::Focus => (0.30, 0.40, 0.35, 0.70),
            Mood::Party => (0.88, 0.75, 0.88, 0.10),
            Mood::Any => (0.55, 0.55, 0.55, 0.35),
        };
        FeatureTargets {
            energy,
            valence,
            danceability,
            acousticness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mood_is_any() {
        let mood: Mood = serde_json::from_str("\"\"").unwrap();
        assert_eq!(mood, Mood::Any);

        let mood: Mood = serde_json::from_str("\"melancholy\"").unwrap();
        assert_eq!(mood, Mood::Any);

        let mood: Mood = serde_json::from_str("\"party\"").unwrap();
        assert_eq!(mood, Mood::Party);
    }

    #[test]
    fn test_centers_in_unit_range() {
        for mood in [Mood::Happy, Mood::Chill, Mood::Focus, Mood::Party, Mood::Any] {
            let c = mood.center();
            for v in [c.energy, c.valence, c.danceability, c.acousticness] {
                assert!((0.0..=1.0).contains(&v), "{mood:?} out of range");
            }
        }
    }
}
