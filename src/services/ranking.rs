//! Final ordering and truncation
//!
//! All sorts are stable, so tracks with equal keys keep their retrieval order.

use std::collections::HashSet;

use crate::models::{ReferenceVector, Track, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Stable sort by an `f64` key, comparing with `total_cmp`
pub fn sort_by_f64<T>(items: &mut [T], direction: Direction, key: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| {
        let ordering = key(a).total_cmp(&key(b));
        match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });
}

/// Stable sort by popularity, most popular first
pub fn sort_by_popularity(tracks: &mut [Track]) {
    tracks.sort_by(|a, b| b.popularity.cmp(&a.popularity));
}

/// Drops the reference and any repeated track id, keeping first occurrences
pub fn dedupe_excluding(tracks: Vec<Track>, reference: &ReferenceVector) -> Vec<Track> {
    let mut seen: HashSet<TrackId> = HashSet::new();
    tracks
        .into_iter()
        .filter(|t| !reference.is_self(t))
        .filter(|t| seen.insert(t.track_id.clone()))
        .collect()
}

pub fn truncate<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    items.truncate(limit);
    items
}
