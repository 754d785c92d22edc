use serde::Serialize;

use super::track::Track;

/// Outcome of a recommendation call
///
/// Serializes untagged: a ranked result is a JSON array, a fallback is a single object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Recommendation {
    /// At most `limit` tracks, reference excluded, de-duplicated
    Ranked(Vec<Track>),
    /// One randomly sampled track, returned when no strategy produced results
    Fallback(Track),
}

impl Recommendation {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Recommendation::Fallback(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Recommendation::Ranked(tracks) => tracks.len(),
            Recommendation::Fallback(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tracks(&self) -> &[Track] {
        match self {
            Recommendation::Ranked(tracks) => tracks,
            Recommendation::Fallback(track) => std::slice::from_ref(track),
        }
    }
}
