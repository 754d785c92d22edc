use std::{collections::HashSet, path::Path};

use rand::seq::IndexedRandom;
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{Artist, ReferenceVector, SearchPage, Track},
    services::{catalog::CatalogSource, similarity},
};

/// Seed file layout: a bare track array, or tracks with their artists
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogSeed {
    Tracks(Vec<Track>),
    Full {
        tracks: Vec<Track>,
        #[serde(default)]
        artists: Vec<Artist>,
    },
}

/// Immutable in-process catalog
///
/// Used for local development (seeded from a JSON file) and for tests. Scoring runs
/// in process with the shared similarity metric.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    tracks: Vec<Track>,
    artists: Vec<Artist>,
}

impl MemoryCatalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            artists: Vec::new(),
        }
    }

    /// Artist names used by [`CatalogSource::search`]
    pub fn with_artists(mut self, artists: Vec<Artist>) -> Self {
        self.artists = artists;
        self
    }

    /// Loads a JSON seed file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read catalog seed {}: {}", path.display(), e))?;
        let seed: CatalogSeed = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid catalog seed {}: {}", path.display(), e))?;

        let catalog = match seed {
            CatalogSeed::Tracks(tracks) => Self::new(tracks),
            CatalogSeed::Full { tracks, artists } => Self::new(tracks).with_artists(artists),
        };

        tracing::info!(
            path = %path.display(),
            track_count = catalog.tracks.len(),
            artist_count = catalog.artists.len(),
            "Loaded in-memory catalog"
        );

        Ok(catalog)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn sorted(mut tracks: Vec<&Track>, sort_by_popularity: bool, n: usize) -> Vec<Track> {
        if sort_by_popularity {
            tracks.sort_by(|a, b| b.popularity.cmp(&a.popularity));
        } else {
            tracks.sort_by(|a, b| a.name.cmp(&b.name));
        }
        tracks.into_iter().take(n).cloned().collect()
    }

    fn scored<'a>(
        &'a self,
        reference: &ReferenceVector,
        threshold: f64,
        n: usize,
        keep: impl Fn(&Track) -> bool,
    ) -> Vec<Track> {
        let mut scored: Vec<(f64, &'a Track)> = self
            .tracks
            .iter()
            .filter(|t| !reference.is_self(t) && keep(*t))
            .filter_map(|t| similarity::score_against(reference, t).map(|s| (s, t)))
            .filter(|(score, _)| *score < threshold)
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sa.total_cmp(sb).then_with(|| a.track_id.cmp(&b.track_id))
        });
        scored.into_iter().take(n).map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait::async_trait]
impl CatalogSource for MemoryCatalog {
    async fn sample_random(&self, n: usize) -> AppResult<Vec<Track>> {
        let mut rng = rand::rng();
        Ok(self.tracks.choose_multiple(&mut rng, n).cloned().collect())
    }

    async fn by_genre(
        &self,
        genre_id: i32,
        n: usize,
        sort_by_popularity: bool,
    ) -> AppResult<Vec<Track>> {
        let matching = self
            .tracks
            .iter()
            .filter(|t| t.genre_id == Some(genre_id))
            .collect();
        Ok(Self::sorted(matching, sort_by_popularity, n))
    }

    async fn by_artist(
        &self,
        artist_id: i32,
        n: usize,
        sort_by_popularity: bool,
    ) -> AppResult<Vec<Track>> {
        let matching = self
            .tracks
            .iter()
            .filter(|t| t.artist_ids.contains(&artist_id))
            .collect();
        Ok(Self::sorted(matching, sort_by_popularity, n))
    }

    async fn by_tempo_window(
        &self,
        target_tempo: f64,
        range_bpm: f64,
        n: usize,
    ) -> AppResult<Vec<Track>> {
        let (low, high) = (target_tempo - range_bpm, target_tempo + range_bpm);
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.tempo().is_some_and(|tempo| tempo >= low && tempo <= high))
            .take(n)
            .cloned()
            .collect())
    }

    async fn scored_similar(
        &self,
        reference: &ReferenceVector,
        threshold: f64,
        n: usize,
    ) -> AppResult<Vec<Track>> {
        Ok(self.scored(reference, threshold, n, |_| true))
    }

    async fn scored_similar_in_genre(
        &self,
        reference: &ReferenceVector,
        genre_id: i32,
        threshold: f64,
        n: usize,
    ) -> AppResult<Vec<Track>> {
        Ok(self.scored(reference, threshold, n, |t| t.genre_id == Some(genre_id)))
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> AppResult<SearchPage> {
        let needle = query.to_lowercase();
        let artist_ids: HashSet<i32> = self
            .artists
            .iter()
            .filter(|a| a.name.to_lowercase().contains(&needle))
            .map(|a| a.artist_id)
            .collect();

        let mut by_name: Vec<&Track> = Vec::new();
        let mut by_artist: Vec<&Track> = Vec::new();
        for track in &self.tracks {
            if track.name.to_lowercase().contains(&needle) {
                by_name.push(track);
            } else if track.artist_ids.iter().any(|id| artist_ids.contains(id)) {
                by_artist.push(track);
            }
        }
        by_name.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        by_artist.sort_by(|a, b| a.track_id.cmp(&b.track_id));

        let total = by_name.len() + by_artist.len();
        let tracks = by_name
            .into_iter()
            .chain(by_artist)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(SearchPage::new(tracks, total, offset, limit))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
