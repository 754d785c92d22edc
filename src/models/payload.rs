use serde::Deserialize;

use super::track::{AudioFeatures, Track, TrackId};

/// Loosely typed track as received over HTTP
///
/// Every field may be missing. [`TrackPayload::into_track`] is the single place where
/// defaults are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackPayload {
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artist_ids: Option<Vec<i32>>,
    #[serde(default)]
    pub album_id: Option<i32>,
    #[serde(default)]
    pub genre_id: Option<i32>,
    #[serde(default)]
    pub popularity: Option<i32>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub explicit: Option<bool>,
    #[serde(default)]
    pub audio_features: Option<AudioFeaturesPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioFeaturesPayload {
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub speechiness: Option<f64>,
    pub loudness: Option<f64>,
    pub tempo: Option<f64>,
    pub key: Option<i32>,
    pub mode: Option<i32>,
    pub time_signature: Option<i32>,
}

impl AudioFeaturesPayload {
    /// Complete features, or `None` if any field is missing
    pub fn complete(&self) -> Option<AudioFeatures> {
        Some(AudioFeatures {
            danceability: self.danceability?,
            energy: self.energy?,
            valence: self.valence?,
            acousticness: self.acousticness?,
            instrumentalness: self.instrumentalness?,
            liveness: self.liveness?,
            speechiness: self.speechiness?,
            loudness: self.loudness?,
            tempo: self.tempo?,
            key: self.key?,
            mode: self.mode?,
            time_signature: self.time_signature?,
        })
    }
}

impl TrackPayload {
    pub fn into_track(self) -> Track {
        let audio_features = self.audio_features.as_ref().and_then(|f| f.complete());

        if self.audio_features.is_some() && audio_features.is_none() {
            tracing::debug!(
                track_id = ?self.track_id,
                "Discarding incomplete audio features"
            );
        }

        Track {
            track_id: TrackId(self.track_id.unwrap_or_default()),
            name: self.name.unwrap_or_default(),
            artist_ids: self.artist_ids.unwrap_or_default(),
            album_id: self.album_id.unwrap_or_default(),
            genre_id: self.genre_id,
            popularity: self.popularity.unwrap_or_default(),
            duration_ms: self.duration_ms.unwrap_or_default(),
            explicit: self.explicit.unwrap_or_default(),
            audio_features,
        }
    }
}
