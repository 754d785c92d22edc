use crate::{
    error::AppResult,
    models::{TrackId, TrackMetadata},
};

pub mod spotify;

pub use spotify::SpotifyClient;

/// Source of display metadata for catalog tracks
///
/// Enrichment never feeds back into scoring; it only decorates API responses.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Metadata for one track; `None` when the service does not know it
    async fn track_metadata(&self, track_id: &TrackId) -> AppResult<Option<TrackMetadata>>;

    /// Metadata for many tracks, in request order, skipping unknown ids
    async fn tracks_metadata(&self, track_ids: &[TrackId]) -> AppResult<Vec<TrackMetadata>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
