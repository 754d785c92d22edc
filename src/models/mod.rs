mod filter_mode;
mod payload;
mod recommendation;
mod search;
mod track;
mod track_metadata;

pub use filter_mode::{limit_from_json, parse_limit, FilterMode, DEFAULT_LIMIT};
pub use payload::{AudioFeaturesPayload, TrackPayload};
pub use recommendation::Recommendation;
pub use search::{like_pattern, Artist, SearchPage};
pub use track::{AudioFeatures, ReferenceError, ReferenceVector, Track, TrackId};
pub use track_metadata::{embed_url, TrackMetadata};

#[cfg(test)]
pub(crate) use track::fixtures;
