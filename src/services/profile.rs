//! Listener taste profile and the synthetic reference track built from it

use serde::{Deserialize, Serialize};

use crate::models::{AudioFeatures, Track, TrackId};

pub const IDEAL_TRACK_ID: &str = "ideal";
pub const IDEAL_TRACK_NAME: &str = "Ideal Track";
const IDEAL_POPULARITY: i32 = 50;

const FIELD_COUNT: usize = 14;

/// How liked tracks are combined into a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileWeighting {
    /// Every liked track counts the same
    #[default]
    Mean,
    /// Tracks are folded oldest first, later ones weigh more
    Recency,
}

/// Running per-feature averages over the tracks a listener accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TasteProfile {
    pub accepted: u32,
    pub avg_duration_ms: f64,
    /// Share of accepted tracks flagged explicit, in `[0, 1]`
    pub avg_explicit: f64,
    pub avg_danceability: f64,
    pub avg_energy: f64,
    pub avg_key: f64,
    pub avg_loudness: f64,
    pub avg_mode: f64,
    pub avg_speechiness: f64,
    pub avg_acousticness: f64,
    pub avg_instrumentalness: f64,
    pub avg_liveness: f64,
    pub avg_valence: f64,
    pub avg_tempo: f64,
    pub avg_time_signature: f64,
}

impl TasteProfile {
    /// Plain mean over every track carrying audio features
    pub fn from_tracks(tracks: &[Track]) -> Self {
        let samples: Vec<[f64; FIELD_COUNT]> = tracks.iter().filter_map(sample).collect();

        let mut profile = Self {
            accepted: samples.len() as u32,
            ..Self::default()
        };
        if samples.is_empty() {
            return profile;
        }

        let count = samples.len() as f64;
        for (i, avg) in profile.averages_mut().into_iter().enumerate() {
            *avg = samples.iter().map(|s| s[i]).sum::<f64>() / count;
        }
        profile
    }

    /// Profile over `tracks` (oldest first) using the requested weighting
    pub fn build(tracks: &[Track], weighting: ProfileWeighting) -> Self {
        match weighting {
            ProfileWeighting::Mean => Self::from_tracks(tracks),
            ProfileWeighting::Recency => {
                let mut profile = Self::default();
                for track in tracks {
                    profile.accept(track);
                }
                profile
            }
        }
    }

    /// Folds one accepted track into the averages
    ///
    /// Recent tracks weigh more: `avg' = (n * avg / 2 + x) / (n / 2 + 1)`. Tracks
    /// without audio features leave the profile untouched.
    pub fn accept(&mut self, track: &Track) {
        let Some(values) = sample(track) else {
            tracing::debug!(track_id = %track.track_id, "Ignoring track without audio features");
            return;
        };

        let n = f64::from(self.accepted);
        let divisor = n / 2.0 + 1.0;
        for (avg, x) in self.averages_mut().into_iter().zip(values) {
            *avg = (n * *avg / 2.0 + x) / divisor;
        }
        self.accepted += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.accepted == 0
    }

    /// Synthetic reference track matching the averages
    ///
    /// An empty profile yields a track without audio features, which the engine answers
    /// with a random fallback.
    pub fn ideal_track(&self) -> Track {
        let audio_features = (!self.is_empty()).then(|| AudioFeatures {
            danceability: self.avg_danceability,
            energy: self.avg_energy,
            valence: self.avg_valence,
            acousticness: self.avg_acousticness,
            instrumentalness: self.avg_instrumentalness,
            liveness: self.avg_liveness,
            speechiness: self.avg_speechiness,
            loudness: self.avg_loudness,
            tempo: self.avg_tempo,
            key: self.avg_key.round() as i32,
            mode: self.avg_mode.round() as i32,
            time_signature: self.avg_time_signature.round() as i32,
        });

        Track {
            track_id: TrackId::new(IDEAL_TRACK_ID),
            name: IDEAL_TRACK_NAME.to_string(),
            artist_ids: Vec::new(),
            album_id: 0,
            genre_id: None,
            popularity: IDEAL_POPULARITY,
            duration_ms: self.avg_duration_ms.round() as i64,
            explicit: self.avg_explicit > 0.5,
            audio_features,
        }
    }

    fn averages_mut(&mut self) -> [&mut f64; FIELD_COUNT] {
        [
            &mut self.avg_duration_ms,
            &mut self.avg_explicit,
            &mut self.avg_danceability,
            &mut self.avg_energy,
            &mut self.avg_key,
            &mut self.avg_loudness,
            &mut self.avg_mode,
            &mut self.avg_speechiness,
            &mut self.avg_acousticness,
            &mut self.avg_instrumentalness,
            &mut self.avg_liveness,
            &mut self.avg_valence,
            &mut self.avg_tempo,
            &mut self.avg_time_signature,
        ]
    }
}

/// Track values in the same order as [`TasteProfile::averages_mut`]
fn sample(track: &Track) -> Option<[f64; FIELD_COUNT]> {
    let f = track.audio_features.as_ref()?;
    Some([
        track.duration_ms as f64,
        if track.explicit { 1.0 } else { 0.0 },
        f.danceability,
        f.energy,
        f64::from(f.key),
        f.loudness,
        f64::from(f.mode),
        f.speechiness,
        f.acousticness,
        f.instrumentalness,
        f.liveness,
        f.valence,
        f.tempo,
        f64::from(f.time_signature),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::track;
    use crate::models::ReferenceVector;

    const EPS: f64 = 1e-9;

    fn with(id: &str, tempo: f64, energy: f64, explicit: bool) -> Track {
        let mut t = track(id);
        t.explicit = explicit;
        if let Some(f) = t.audio_features.as_mut() {
            f.tempo = tempo;
            f.energy = energy;
        }
        t
    }

    #[test]
    fn test_from_tracks_is_plain_mean() {
        let mut silent = track("silent");
        silent.audio_features = None;
        let tracks = vec![
            with("a", 100.0, 0.4, true),
            with("b", 140.0, 0.8, false),
            silent,
        ];

        let profile = TasteProfile::from_tracks(&tracks);
        assert_eq!(profile.accepted, 2);
        assert!((profile.avg_tempo - 120.0).abs() < EPS);
        assert!((profile.avg_energy - 0.6).abs() < EPS);
        assert!((profile.avg_explicit - 0.5).abs() < EPS);
    }

    #[test]
    fn test_first_accept_copies_track() {
        let mut profile = TasteProfile::default();
        profile.accept(&with("a", 128.0, 0.9, true));

        assert_eq!(profile.accepted, 1);
        assert!((profile.avg_tempo - 128.0).abs() < EPS);
        assert!((profile.avg_explicit - 1.0).abs() < EPS);
    }

    #[test]
    fn test_accept_weights_recent_tracks() {
        let mut profile = TasteProfile::default();
        profile.accept(&with("a", 100.0, 0.2, false));
        profile.accept(&with("b", 130.0, 0.8, false));

        // n = 1: (0.5 * 100 + 130) / 1.5
        assert!((profile.avg_tempo - 120.0).abs() < EPS);
        assert!((profile.avg_energy - 0.6).abs() < EPS);
        assert_eq!(profile.accepted, 2);

        // n = 2: (1 * 120 + 60) / 2
        profile.accept(&with("c", 60.0, 0.6, false));
        assert!((profile.avg_tempo - 90.0).abs() < EPS);
    }

    #[test]
    fn test_build_with_recency_folds_in_order() {
        let history = vec![
            with("a", 100.0, 0.2, false),
            with("b", 130.0, 0.8, false),
            with("c", 60.0, 0.6, false),
        ];

        let recency = TasteProfile::build(&history, ProfileWeighting::Recency);
        assert_eq!(recency.accepted, 3);
        assert!((recency.avg_tempo - 90.0).abs() < EPS);

        let mean = TasteProfile::build(&history, ProfileWeighting::Mean);
        assert_eq!(mean, TasteProfile::from_tracks(&history));
        assert!((mean.avg_tempo - 290.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_weighting_parses_lowercase() {
        let weighting: ProfileWeighting = serde_json::from_str("\"recency\"").unwrap();
        assert_eq!(weighting, ProfileWeighting::Recency);
        assert_eq!(ProfileWeighting::default(), ProfileWeighting::Mean);
    }

    #[test]
    fn test_accept_ignores_featureless_tracks() {
        let mut profile = TasteProfile::default();
        let mut silent = track("silent");
        silent.audio_features = None;
        profile.accept(&silent);
        assert_eq!(profile, TasteProfile::default());
    }

    #[test]
    fn test_ideal_track_shape() {
        let mut profile = TasteProfile::from_tracks(&[track("a"), track("b")]);
        profile.avg_key = 4.6;
        profile.avg_mode = 0.4;
        profile.avg_time_signature = 3.5;
        profile.avg_explicit = 0.5;

        let ideal = profile.ideal_track();
        assert_eq!(ideal.track_id.as_str(), IDEAL_TRACK_ID);
        assert_eq!(ideal.name, IDEAL_TRACK_NAME);
        assert!(ideal.artist_ids.is_empty());
        assert_eq!(ideal.genre_id, None);
        assert_eq!(ideal.album_id, 0);
        assert_eq!(ideal.popularity, 50);
        assert_eq!(ideal.duration_ms, 200_000);
        assert!(!ideal.explicit);

        let features = ideal.audio_features.unwrap();
        assert_eq!(features.key, 5);
        assert_eq!(features.mode, 0);
        assert_eq!(features.time_signature, 4);
        assert!((features.tempo - 120.0).abs() < EPS);
    }

    #[test]
    fn test_empty_profile_has_no_usable_reference() {
        let ideal = TasteProfile::default().ideal_track();
        assert!(ideal.audio_features.is_none());
        assert!(ReferenceVector::try_from(ideal).is_err());
    }
}
