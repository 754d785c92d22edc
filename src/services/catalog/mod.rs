//! Catalog abstraction
//!
//! The recommendation engine only sees tracks through [`CatalogSource`]. Connection
//! management, pooling and query timeouts belong to the implementation.

use crate::{
    error::AppResult,
    models::{ReferenceVector, SearchPage, Track},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

/// Supplier of candidate tracks
///
/// Scored queries must use the weighting in [`crate::services::similarity`], return only
/// tracks scoring strictly below `threshold`, exclude the reference by id, and order by
/// ascending score with ties broken by track id.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Up to `n` tracks sampled uniformly at random
    async fn sample_random(&self, n: usize) -> AppResult<Vec<Track>>;

    /// Tracks of one genre, by popularity descending or name ascending
    async fn by_genre(
        &self,
        genre_id: i32,
        n: usize,
        sort_by_popularity: bool,
    ) -> AppResult<Vec<Track>>;

    /// Tracks credited to one artist, by popularity descending or name ascending
    async fn by_artist(
        &self,
        artist_id: i32,
        n: usize,
        sort_by_popularity: bool,
    ) -> AppResult<Vec<Track>>;

    /// Tracks whose tempo lies in `[target - range, target + range]`
    async fn by_tempo_window(
        &self,
        target_tempo: f64,
        range_bpm: f64,
        n: usize,
    ) -> AppResult<Vec<Track>>;

    /// Tracks scoring below `threshold` against the reference
    async fn scored_similar(
        &self,
        reference: &ReferenceVector,
        threshold: f64,
        n: usize,
    ) -> AppResult<Vec<Track>>;

    /// Same as [`CatalogSource::scored_similar`], restricted to one genre
    async fn scored_similar_in_genre(
        &self,
        reference: &ReferenceVector,
        genre_id: i32,
        threshold: f64,
        n: usize,
    ) -> AppResult<Vec<Track>>;

    /// Case-insensitive substring search over track names and artist names
    ///
    /// Tracks matching by name come first, then tracks credited to a matching artist,
    /// each group ordered by track id and every track listed once. `query` is already
    /// trimmed and non-empty.
    async fn search(&self, query: &str, limit: usize, offset: usize) -> AppResult<SearchPage>;

    /// Backend name for logging and debugging
    fn name(&self) -> &'static str;
}
