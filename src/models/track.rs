use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Stable catalog identifier of a track
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Audio descriptor of a track, as produced by the Spotify audio-features analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub valence: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub speechiness: f64,
    /// Decibels, usually negative
    pub loudness: f64,
    /// Beats per minute
    pub tempo: f64,
    /// Pitch class, 0-11
    pub key: i32,
    /// 1 = major, 0 = minor
    pub mode: i32,
    pub time_signature: i32,
}

/// A catalog track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: TrackId,
    pub name: String,
    pub artist_ids: Vec<i32>,
    pub album_id: i32,
    /// `None` never matches another track's genre
    pub genre_id: Option<i32>,
    pub popularity: i32,
    pub duration_ms: i64,
    pub explicit: bool,
    pub audio_features: Option<AudioFeatures>,
}

impl Track {
    /// Whether both tracks carry the same (known) genre
    pub fn same_genre(&self, other: &Track) -> bool {
        matches!((self.genre_id, other.genre_id), (Some(a), Some(b)) if a == b)
    }

    /// Whether the tracks have at least one artist in common
    pub fn shares_artist(&self, other: &Track) -> bool {
        self.artist_ids
            .iter()
            .any(|id| other.artist_ids.contains(id))
    }

    pub fn energy(&self) -> Option<f64> {
        self.audio_features.map(|f| f.energy)
    }

    pub fn tempo(&self) -> Option<f64> {
        self.audio_features.map(|f| f.tempo)
    }
}

/// Reasons a track cannot serve as a comparison origin
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("track {track_id} has no audio features")]
    MissingAudioFeatures { track_id: TrackId },
}

/// A track that is guaranteed to carry audio features
///
/// Built once at the engine boundary, so strategies never re-check for missing features.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceVector {
    track: Track,
    features: AudioFeatures,
}

impl ReferenceVector {
    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn features(&self) -> &AudioFeatures {
        &self.features
    }

    pub fn id(&self) -> &TrackId {
        &self.track.track_id
    }

    /// True when `candidate` is the reference itself
    pub fn is_self(&self, candidate: &Track) -> bool {
        candidate.track_id == self.track.track_id
    }
}

impl TryFrom<Track> for ReferenceVector {
    type Error = ReferenceError;

    fn try_from(track: Track) -> Result<Self, Self::Error> {
        match track.audio_features {
            Some(features) => Ok(Self { track, features }),
            None => Err(ReferenceError::MissingAudioFeatures {
                track_id: track.track_id.clone(),
            }),
        }
    }
}
