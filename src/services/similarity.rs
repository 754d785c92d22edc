//! Weighted audio-feature similarity
//!
//! Lower scores mean more similar tracks. The metric is expressed as a table of
//! [`Dimension`]s so that in-process scoring and the SQL used by the Postgres catalog
//! are generated from the same weights.

use crate::models::{AudioFeatures, ReferenceVector, Track};

pub const HIGH_WEIGHT: f64 = 1.5;
pub const MEDIUM_WEIGHT: f64 = 1.0;
pub const LOW_WEIGHT: f64 = 0.5;

/// Penalty applied (before weighting) when explicit flags differ
pub const EXPLICIT_MISMATCH_PENALTY: f64 = 0.3;

/// Subtracted from the score when both tracks share a genre
pub const SAME_GENRE_BONUS: f64 = 0.1;

/// Subtracted from the score when the tracks share an artist but not a genre
pub const SHARED_ARTIST_BONUS: f64 = 0.05;

/// One input of the similarity metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Energy,
    Danceability,
    Valence,
    Tempo,
    Acousticness,
    Loudness,
    Instrumentalness,
    Explicit,
    Duration,
    Speechiness,
    Liveness,
    Key,
    Mode,
    TimeSignature,
}

/// Every dimension, highest weight tier first
pub const DIMENSIONS: [Dimension; 14] = [
    Dimension::Energy,
    Dimension::Danceability,
    Dimension::Valence,
    Dimension::Tempo,
    Dimension::Acousticness,
    Dimension::Loudness,
    Dimension::Instrumentalness,
    Dimension::Explicit,
    Dimension::Duration,
    Dimension::Speechiness,
    Dimension::Liveness,
    Dimension::Key,
    Dimension::Mode,
    Dimension::TimeSignature,
];

impl Dimension {
    pub fn weight(self) -> f64 {
        match self {
            Dimension::Energy | Dimension::Danceability | Dimension::Valence | Dimension::Tempo => {
                HIGH_WEIGHT
            }
            Dimension::Acousticness
            | Dimension::Loudness
            | Dimension::Instrumentalness
            | Dimension::Explicit => MEDIUM_WEIGHT,
            Dimension::Duration
            | Dimension::Speechiness
            | Dimension::Liveness
            | Dimension::Key
            | Dimension::Mode
            | Dimension::TimeSignature => LOW_WEIGHT,
        }
    }

    /// Column holding this dimension in the `tracks` table, cast to float where needed
    pub fn column(self) -> &'static str {
        match self {
            Dimension::Energy => "energy",
            Dimension::Danceability => "danceability",
            Dimension::Valence => "valence",
            Dimension::Tempo => "tempo",
            Dimension::Acousticness => "acousticness",
            Dimension::Loudness => "loudness",
            Dimension::Instrumentalness => "instrumentalness",
            Dimension::Explicit => "explicit",
            Dimension::Duration => "duration_ms::float8",
            Dimension::Speechiness => "speechiness",
            Dimension::Liveness => "liveness",
            Dimension::Key => "key::float8",
            Dimension::Mode => "mode::float8",
            Dimension::TimeSignature => "time_signature::float8",
        }
    }

    /// Numeric value of the dimension; `None` for the categorical explicit flag
    pub fn value(self, track: &Track, features: &AudioFeatures) -> Option<f64> {
        let value = match self {
            Dimension::Energy => features.energy,
            Dimension::Danceability => features.danceability,
            Dimension::Valence => features.valence,
            Dimension::Tempo => features.tempo,
            Dimension::Acousticness => features.acousticness,
            Dimension::Loudness => features.loudness,
            Dimension::Instrumentalness => features.instrumentalness,
            Dimension::Explicit => return None,
            Dimension::Duration => track.duration_ms as f64,
            Dimension::Speechiness => features.speechiness,
            Dimension::Liveness => features.liveness,
            Dimension::Key => features.key as f64,
            Dimension::Mode => features.mode as f64,
            Dimension::TimeSignature => features.time_signature as f64,
        };
        Some(value)
    }
}

/// Sum of all dimension weights (13)
pub fn total_weight() -> f64 {
    DIMENSIONS.iter().map(|d| d.weight()).sum()
}

fn is_unit(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Distance between two values of one dimension.
///
/// Unit-range values use the absolute difference; anything else is divided by
/// `max(|a|, |b|, 1)` so tempo, loudness and duration cannot dominate.
pub fn distance(a: f64, b: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 0.0;
    }
    let diff = (a - b).abs();
    if is_unit(a) && is_unit(b) {
        return diff;
    }
    diff / a.abs().max(b.abs()).max(1.0)
}

/// A track together with its (present) audio features
#[derive(Debug, Clone, Copy)]
pub struct FeatureView<'a> {
    pub track: &'a Track,
    pub features: &'a AudioFeatures,
}

impl<'a> FeatureView<'a> {
    pub fn of(track: &'a Track) -> Option<Self> {
        track
            .audio_features
            .as_ref()
            .map(|features| Self { track, features })
    }

    pub fn reference(reference: &'a ReferenceVector) -> Self {
        Self {
            track: reference.track(),
            features: reference.features(),
        }
    }
}

fn dimension_distance(dimension: Dimension, a: FeatureView<'_>, b: FeatureView<'_>) -> f64 {
    match (
        dimension.value(a.track, a.features),
        dimension.value(b.track, b.features),
    ) {
        (Some(x), Some(y)) => distance(x, y),
        _ if a.track.explicit == b.track.explicit => 0.0,
        _ => EXPLICIT_MISMATCH_PENALTY,
    }
}

/// Weighted average distance before categorical bonuses
pub fn base_score(a: FeatureView<'_>, b: FeatureView<'_>) -> f64 {
    let weighted: f64 = DIMENSIONS
        .iter()
        .map(|&d| dimension_distance(d, a, b) * d.weight())
        .sum();
    weighted / total_weight()
}

/// Similarity score between two tracks. Symmetric.
pub fn compare(a: FeatureView<'_>, b: FeatureView<'_>) -> f64 {
    let base = base_score(a, b);
    if a.track.same_genre(b.track) {
        return (base - SAME_GENRE_BONUS).max(0.0);
    }
    if a.track.shares_artist(b.track) {
        return (base - SHARED_ARTIST_BONUS).max(0.0);
    }
    base
}

/// Scores `candidate` against the reference, or `None` if it has no audio features
pub fn score_against(reference: &ReferenceVector, candidate: &Track) -> Option<f64> {
    FeatureView::of(candidate).map(|c| compare(FeatureView::reference(reference), c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::track;

    const EPS: f64 = 1e-12;

    fn view(t: &Track) -> FeatureView<'_> {
        FeatureView::of(t).unwrap()
    }

    #[test]
    fn test_total_weight_is_thirteen() {
        assert!((total_weight() - 13.0).abs() < EPS);
    }

    #[test]
    fn test_distance_identity() {
        for x in [0.0, 0.3, 1.0, -7.5, 120.0, 240_000.0, 11.0] {
            assert_eq!(distance(x, x), 0.0, "distance({x}, {x})");
        }
    }

    #[test]
    fn test_distance_unit_range_is_absolute() {
        assert!((distance(0.2, 0.5) - 0.3).abs() < EPS);
        assert!((distance(1.0, 0.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_distance_large_values_are_relative() {
        assert!((distance(120.0, 132.0) - 12.0 / 132.0).abs() < EPS);
        assert!((distance(-5.0, -10.0) - 0.5).abs() < EPS);
        // One value in range, one outside: relative rule with floor of 1
        assert!((distance(0.5, 2.0) - 0.75).abs() < EPS);
        assert!((distance(-0.5, 0.5) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_compare_identical_tracks_is_zero() {
        let a = track("a");
        assert_eq!(compare(view(&a), view(&a)), 0.0);
    }

    #[test]
    fn test_compare_is_symmetric() {
        let mut a = track("a");
        let mut b = track("b");
        a.genre_id = Some(1);
        b.genre_id = Some(2);
        a.artist_ids = vec![7];
        b.artist_ids = vec![7, 8];
        a.explicit = true;
        b.duration_ms = 310_000;
        if let Some(f) = b.audio_features.as_mut() {
            f.tempo = 95.0;
            f.energy = 0.3;
            f.loudness = -12.0;
            f.key = 2;
            f.mode = 0;
        }
        let ab = compare(view(&a), view(&b));
        let ba = compare(view(&b), view(&a));
        assert!((ab - ba).abs() < EPS);
    }

    #[test]
    fn test_explicit_mismatch_penalty() {
        // Identical features, only the explicit flag differs
        let mut reference = track("ref");
        let candidate = track("cand");
        reference.explicit = true;

        let score = compare(view(&reference), view(&candidate));
        let expected = EXPLICIT_MISMATCH_PENALTY * MEDIUM_WEIGHT / 13.0;
        assert!((score - expected).abs() < EPS, "{score} != {expected}");
    }

    #[test]
    fn test_near_identical_same_genre_scores_zero() {
        let mut reference = track("ref");
        let mut candidate = track("cand");
        reference.genre_id = Some(5);
        candidate.genre_id = Some(5);
        if let Some(f) = candidate.audio_features.as_mut() {
            f.tempo = 121.0;
            f.energy = 0.81;
            f.danceability = 0.69;
            f.valence = 0.59;
        }

        let base = base_score(view(&reference), view(&candidate));
        assert!(base < 0.01, "base score {base}");
        assert_eq!(compare(view(&reference), view(&candidate)), 0.0);
    }

    #[test]
    fn test_genre_bonus_takes_precedence_over_artist() {
        let mut reference = track("ref");
        let mut candidate = track("cand");
        candidate.duration_ms = 400_000;
        if let Some(f) = candidate.audio_features.as_mut() {
            f.tempo = 60.0;
            f.energy = 0.2;
            f.valence = 0.0;
        }
        let base = base_score(view(&reference), view(&candidate));
        assert!(base > SAME_GENRE_BONUS);

        reference.artist_ids = vec![3];
        candidate.artist_ids = vec![3];
        let artist_only = compare(view(&reference), view(&candidate));
        assert!((artist_only - (base - SHARED_ARTIST_BONUS)).abs() < EPS);

        reference.genre_id = Some(9);
        candidate.genre_id = Some(9);
        let genre_and_artist = compare(view(&reference), view(&candidate));
        assert!((genre_and_artist - (base - SAME_GENRE_BONUS)).abs() < EPS);
    }

    #[test]
    fn test_score_is_not_bounded_by_one() {
        let reference = track("ref");
        let mut candidate = track("cand");
        candidate.explicit = true;
        candidate.duration_ms = 1;
        if let Some(f) = candidate.audio_features.as_mut() {
            *f = AudioFeatures {
                danceability: 0.0,
                energy: 0.0,
                valence: 0.0,
                acousticness: 1.0,
                instrumentalness: 1.0,
                liveness: 1.0,
                speechiness: 1.0,
                loudness: 5.0,
                tempo: -120.0,
                key: 0,
                mode: 0,
                time_signature: 1,
            };
        }
        let score = compare(view(&reference), view(&candidate));
        assert!(score > 1.0, "{score}");
    }

    #[test]
    fn test_score_against_skips_featureless_candidates() {
        let reference = ReferenceVector::try_from(track("ref")).unwrap();
        let mut candidate = track("cand");
        assert_eq!(score_against(&reference, &candidate), Some(0.0));

        candidate.audio_features = None;
        assert_eq!(score_against(&reference, &candidate), None);
    }

    #[test]
    fn test_scoring_does_not_mutate_tracks() {
        let a = track("a");
        let b = track("b");
        let (a_before, b_before) = (a.clone(), b.clone());
        let _ = compare(view(&a), view(&b));
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }
}
