use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::track::TrackId;

/// Display metadata for a catalog track, fetched from the streaming service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub track_id: TrackId,
    pub name: String,
    pub artists: Vec<String>,
    pub album_name: String,
    /// Largest album image, if any
    pub image_url: Option<String>,
    pub preview_url: Option<String>,
    pub spotify_url: Option<String>,
    pub embed_url: String,
    pub fetched_at: DateTime<Utc>,
}

/// Embeddable player URL for a track
pub fn embed_url(track_id: &TrackId) -> String {
    format!(
        "https://open.spotify.com/embed/track/{}?utm_source=generator",
        track_id
    )
}
