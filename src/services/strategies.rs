//! Retrieval and ranking strategies, one per [`FilterMode`]
//!
//! Every strategy receives an already-validated reference and returns at most `limit`
//! tracks. An empty result is not an error; the engine substitutes a fallback.

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{FilterMode, ReferenceVector, Track},
    services::{
        catalog::CatalogSource,
        escalation::ThresholdEscalator,
        ranking::{self, Direction},
        similarity,
    },
};

/// `top`: scored pull, loosened once if too few candidates come back
pub const TOP_ESCALATOR: ThresholdEscalator = ThresholdEscalator::new(&[0.15, 0.20]);
/// `top`: candidates scoring at or above this are discarded
pub const TOP_SCORE_CUTOFF: f64 = 0.20;
const TOP_CANDIDATE_FACTOR: usize = 5;
const TOP_SHORTLIST_FACTOR: usize = 2;

/// `genre`: scored same-genre pull before falling back to a popularity listing
pub const GENRE_ESCALATOR: ThresholdEscalator = ThresholdEscalator::new(&[0.20, 0.30]);

const ARTIST_CANDIDATE_FACTOR: usize = 2;

pub const ENERGY_ESCALATOR: ThresholdEscalator = ThresholdEscalator::new(&[0.20]);
pub const ENERGY_MIN: f64 = 0.6;
pub const ENERGY_RELAXED_MIN: f64 = 0.5;
const ENERGY_CANDIDATE_FACTOR: usize = 3;

pub const TEMPO_RANGE_BPM: f64 = 10.0;
const TEMPO_CANDIDATE_FACTOR: usize = 2;

/// Dispatches to the strategy for `mode`
pub async fn run(
    mode: FilterMode,
    catalog: &Arc<dyn CatalogSource>,
    reference: &ReferenceVector,
    limit: usize,
) -> AppResult<Vec<Track>> {
    tracing::info!(
        mode = %mode,
        reference = %reference.id(),
        limit,
        catalog = catalog.name(),
        "Running recommendation strategy"
    );

    match mode {
        FilterMode::Top => top(catalog.as_ref(), reference, limit).await,
        FilterMode::Genre => genre(catalog.as_ref(), reference, limit).await,
        FilterMode::Artist => artist(catalog, reference, limit).await,
        FilterMode::Energy => energy(catalog.as_ref(), reference, limit).await,
        FilterMode::Tempo => tempo(catalog.as_ref(), reference, limit).await,
    }
}

/// Most similar candidates, re-ranked by popularity
async fn top(
    catalog: &dyn CatalogSource,
    reference: &ReferenceVector,
    limit: usize,
) -> AppResult<Vec<Track>> {
    let pool = limit.saturating_mul(TOP_CANDIDATE_FACTOR);
    let escalation = TOP_ESCALATOR
        .run(limit, move |threshold| {
            catalog.scored_similar(reference, threshold, pool)
        })
        .await?;

    let mut scored: Vec<(f64, Track)> = ranking::dedupe_excluding(escalation.candidates, reference)
        .into_iter()
        .filter_map(|t| similarity::score_against(reference, &t).map(|score| (score, t)))
        .filter(|(score, _)| *score < TOP_SCORE_CUTOFF)
        .collect();

    ranking::sort_by_f64(&mut scored, Direction::Ascending, |(score, _)| *score);
    scored.truncate(limit.saturating_mul(TOP_SHORTLIST_FACTOR));

    let mut shortlist: Vec<Track> = scored.into_iter().map(|(_, t)| t).collect();
    ranking::sort_by_popularity(&mut shortlist);

    Ok(ranking::truncate(shortlist, limit))
}

/// Similar tracks of the reference's genre, or its most popular tracks
async fn genre(
    catalog: &dyn CatalogSource,
    reference: &ReferenceVector,
    limit: usize,
) -> AppResult<Vec<Track>> {
    let Some(genre_id) = reference.track().genre_id else {
        tracing::debug!(reference = %reference.id(), "Reference has no genre");
        return Ok(Vec::new());
    };

    let escalation = GENRE_ESCALATOR
        .run(limit, move |threshold| {
            catalog.scored_similar_in_genre(reference, genre_id, threshold, limit)
        })
        .await?;

    if escalation.satisfied {
        let similar = ranking::dedupe_excluding(escalation.candidates, reference);
        return Ok(ranking::truncate(similar, limit));
    }

    tracing::debug!(
        genre_id,
        found = escalation.candidates.len(),
        "Too few similar tracks in genre, listing by popularity"
    );

    // One extra row so dropping the reference still leaves `limit`
    let listed = catalog
        .by_genre(genre_id, limit.saturating_add(1), true)
        .await?;
    Ok(ranking::truncate(
        ranking::dedupe_excluding(listed, reference),
        limit,
    ))
}

/// Most popular tracks by any of the reference's artists
async fn artist(
    catalog: &Arc<dyn CatalogSource>,
    reference: &ReferenceVector,
    limit: usize,
) -> AppResult<Vec<Track>> {
    let per_artist = limit.saturating_mul(ARTIST_CANDIDATE_FACTOR);

    let mut tasks = Vec::new();
    for &artist_id in &reference.track().artist_ids {
        let catalog = Arc::clone(catalog);
        let task =
            tokio::spawn(async move { catalog.by_artist(artist_id, per_artist, true).await });
        tasks.push(task);
    }

    // Awaiting in artist order keeps the merge deterministic
    let mut merged = Vec::new();
    for task in tasks {
        let tracks = task
            .await
            .map_err(|e| AppError::Internal(format!("Artist query task failed: {}", e)))??;
        merged.extend(tracks);
    }

    let mut unique = ranking::dedupe_excluding(merged, reference);
    ranking::sort_by_popularity(&mut unique);
    Ok(ranking::truncate(unique, limit))
}

/// Similar tracks with high energy, most energetic first
async fn energy(
    catalog: &dyn CatalogSource,
    reference: &ReferenceVector,
    limit: usize,
) -> AppResult<Vec<Track>> {
    let pool = limit.saturating_mul(ENERGY_CANDIDATE_FACTOR);
    let escalation = ENERGY_ESCALATOR
        .run(limit, move |threshold| {
            catalog.scored_similar(reference, threshold, pool)
        })
        .await?;
    let candidates = ranking::dedupe_excluding(escalation.candidates, reference);

    let strict = energetic(&candidates, ENERGY_MIN, limit);
    if strict.len() >= limit {
        return Ok(strict);
    }

    tracing::debug!(
        found = strict.len(),
        min_energy = ENERGY_RELAXED_MIN,
        "Relaxing energy bound"
    );
    Ok(energetic(&candidates, ENERGY_RELAXED_MIN, limit))
}

fn energetic(candidates: &[Track], min_energy: f64, limit: usize) -> Vec<Track> {
    let mut kept: Vec<(f64, Track)> = candidates
        .iter()
        .filter_map(|t| t.energy().map(|e| (e, t.clone())))
        .filter(|(e, _)| *e >= min_energy)
        .collect();
    ranking::sort_by_f64(&mut kept, Direction::Descending, |(e, _)| *e);
    kept.truncate(limit);
    kept.into_iter().map(|(_, t)| t).collect()
}

/// Tracks within a tempo window, closest tempo first
async fn tempo(
    catalog: &dyn CatalogSource,
    reference: &ReferenceVector,
    limit: usize,
) -> AppResult<Vec<Track>> {
    let target = reference.features().tempo;
    let window = catalog
        .by_tempo_window(
            target,
            TEMPO_RANGE_BPM,
            limit.saturating_mul(TEMPO_CANDIDATE_FACTOR),
        )
        .await?;

    let mut by_distance: Vec<(f64, Track)> = ranking::dedupe_excluding(window, reference)
        .into_iter()
        .filter_map(|t| t.tempo().map(|tempo| ((tempo - target).abs(), t)))
        .collect();
    ranking::sort_by_f64(&mut by_distance, Direction::Ascending, |(d, _)| *d);
    by_distance.truncate(limit);

    Ok(by_distance.into_iter().map(|(_, t)| t).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::track;
    use crate::services::catalog::{MemoryCatalog, MockCatalogSource};

    fn catalog(tracks: Vec<Track>) -> Arc<dyn CatalogSource> {
        Arc::new(MemoryCatalog::new(tracks))
    }

    fn reference(t: Track) -> ReferenceVector {
        ReferenceVector::try_from(t).unwrap()
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.track_id.as_str()).collect()
    }

    fn tweak(id: &str, f: impl FnOnce(&mut Track)) -> Track {
        let mut t = track(id);
        f(&mut t);
        t
    }

    #[tokio::test]
    async fn test_top_reranks_similar_by_popularity() {
        let base = track("ref");
        let tracks = vec![
            base.clone(),
            tweak("close-unpopular", |t| t.popularity = 10),
            tweak("close-popular", |t| {
                t.popularity = 90;
                if let Some(f) = t.audio_features.as_mut() {
                    f.tempo = 124.0;
                }
            }),
            tweak("too-far", |t| {
                t.popularity = 100;
                t.explicit = true;
                t.duration_ms = 600_000;
                if let Some(f) = t.audio_features.as_mut() {
                    f.energy = 0.1;
                    f.danceability = 0.1;
                    f.valence = 0.1;
                    f.tempo = 60.0;
                }
            }),
        ];
        let catalog = catalog(tracks);

        let result = run(FilterMode::Top, &catalog, &reference(base), 5).await.unwrap();
        assert_eq!(ids(&result), vec!["close-popular", "close-unpopular"]);
    }

    #[tokio::test]
    async fn test_top_never_returns_reference() {
        let base = track("ref");
        let catalog = catalog(vec![base.clone(), base.clone(), track("other")]);

        let result = run(FilterMode::Top, &catalog, &reference(base), 5).await.unwrap();
        assert_eq!(ids(&result), vec!["other"]);
    }

    #[tokio::test]
    async fn test_top_shortlist_is_twice_limit_before_popularity() {
        // The shortlist keeps the best 2 * limit by score, so the most popular
        // but least similar track is cut before re-ranking.
        let base = track("ref");
        let tracks = vec![
            tweak("s1", |t| t.popularity = 1),
            tweak("s2", |t| t.popularity = 2),
            tweak("s3", |t| {
                t.popularity = 99;
                if let Some(f) = t.audio_features.as_mut() {
                    f.tempo = 130.0;
                }
            }),
        ];
        let catalog = catalog(tracks);

        let result = run(FilterMode::Top, &catalog, &reference(base), 1).await.unwrap();
        assert_eq!(ids(&result), vec!["s2"]);
    }

    #[tokio::test]
    async fn test_top_escalates_when_too_few_candidates() {
        let mut mock = MockCatalogSource::new();
        mock.expect_name().return_const("mock");
        mock.expect_scored_similar()
            .withf(|_, threshold, n| *threshold == 0.15 && *n == 10)
            .times(1)
            .returning(|_, _, _| Ok(vec![track("a")]));
        mock.expect_scored_similar()
            .withf(|_, threshold, n| *threshold == 0.20 && *n == 10)
            .times(1)
            .returning(|_, _, _| Ok(vec![track("a"), track("b")]));

        let catalog: Arc<dyn CatalogSource> = Arc::new(mock);
        let result = run(FilterMode::Top, &catalog, &reference(track("ref")), 2).await.unwrap();
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_genre_prefers_scored_same_genre() {
        let base = tweak("ref", |t| t.genre_id = Some(5));
        let tracks = vec![
            base.clone(),
            tweak("g1", |t| t.genre_id = Some(5)),
            tweak("g2", |t| {
                t.genre_id = Some(5);
                t.popularity = 99;
                if let Some(f) = t.audio_features.as_mut() {
                    f.tempo = 125.0;
                }
            }),
            tweak("other-genre", |t| t.genre_id = Some(6)),
        ];
        let catalog = catalog(tracks);

        let result = run(FilterMode::Genre, &catalog, &reference(base), 2).await.unwrap();
        // Scored path keeps similarity order
        assert_eq!(ids(&result), vec!["g1", "g2"]);
    }

    #[tokio::test]
    async fn test_genre_falls_back_to_popularity_listing() {
        let base = tweak("ref", |t| {
            t.genre_id = Some(5);
            t.popularity = 100;
        });
        let dissimilar = |id: &str, popularity: i32| {
            tweak(id, |t| {
                t.genre_id = Some(5);
                t.popularity = popularity;
                t.explicit = true;
                if let Some(f) = t.audio_features.as_mut() {
                    f.energy = 0.0;
                    f.danceability = 0.0;
                    f.valence = 1.0;
                    f.acousticness = 1.0;
                    f.tempo = 40.0;
                }
            })
        };
        let tracks = vec![
            base.clone(),
            dissimilar("low", 10),
            dissimilar("high", 80),
            tweak("elsewhere", |t| t.genre_id = Some(7)),
        ];
        let catalog = catalog(tracks);

        let result = run(FilterMode::Genre, &catalog, &reference(base), 3).await.unwrap();
        assert_eq!(ids(&result), vec!["high", "low"]);
        assert!(result.iter().all(|t| t.genre_id == Some(5)));
    }

    #[tokio::test]
    async fn test_genre_without_reference_genre_is_empty() {
        let catalog = catalog(vec![track("a")]);
        let result = run(FilterMode::Genre, &catalog, &reference(track("ref")), 3).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_artist_merges_dedupes_and_sorts() {
        let base = tweak("ref", |t| t.artist_ids = vec![1, 2]);
        let tracks = vec![
            base.clone(),
            tweak("solo-1", |t| {
                t.artist_ids = vec![1];
                t.popularity = 40;
            }),
            tweak("duet", |t| {
                t.artist_ids = vec![1, 2];
                t.popularity = 70;
            }),
            tweak("solo-2", |t| {
                t.artist_ids = vec![2];
                t.popularity = 90;
            }),
            tweak("stranger", |t| {
                t.artist_ids = vec![3];
                t.popularity = 100;
            }),
        ];
        let catalog = catalog(tracks);
        let reference = reference(base);

        let result = run(FilterMode::Artist, &catalog, &reference, 5).await.unwrap();
        assert_eq!(ids(&result), vec!["solo-2", "duet", "solo-1"]);
        assert!(result.iter().all(|t| t.shares_artist(reference.track())));
    }

    #[tokio::test]
    async fn test_artist_propagates_catalog_errors() {
        let mut mock = MockCatalogSource::new();
        mock.expect_name().return_const("mock");
        mock.expect_by_artist()
            .returning(|_, _, _| Err(AppError::Internal("connection reset".to_string())));

        let catalog: Arc<dyn CatalogSource> = Arc::new(mock);
        let base = tweak("ref", |t| t.artist_ids = vec![1]);
        let result = run(FilterMode::Artist, &catalog, &reference(base), 5).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_energy_keeps_high_energy_sorted_descending() {
        let with_energy = |id: &str, energy: f64| {
            tweak(id, |t| {
                if let Some(f) = t.audio_features.as_mut() {
                    f.energy = energy;
                }
            })
        };
        let base = track("ref");
        let catalog = catalog(vec![
            base.clone(),
            with_energy("e70", 0.70),
            with_energy("e90", 0.90),
            with_energy("e55", 0.55),
            with_energy("e80", 0.80),
        ]);

        let result = run(FilterMode::Energy, &catalog, &reference(base), 2).await.unwrap();
        assert_eq!(ids(&result), vec!["e90", "e80"]);
        assert!(result.iter().all(|t| t.energy().unwrap() >= ENERGY_MIN));
    }

    #[tokio::test]
    async fn test_energy_relaxes_bound_when_short() {
        let with_energy = |id: &str, energy: f64| {
            tweak(id, |t| {
                if let Some(f) = t.audio_features.as_mut() {
                    f.energy = energy;
                }
            })
        };
        let base = track("ref");
        let catalog = catalog(vec![
            base.clone(),
            with_energy("e65", 0.65),
            with_energy("e55", 0.55),
            with_energy("e45", 0.45),
        ]);

        let result = run(FilterMode::Energy, &catalog, &reference(base), 3).await.unwrap();
        assert_eq!(ids(&result), vec!["e65", "e55"]);
        assert!(result.iter().all(|t| t.energy().unwrap() >= ENERGY_RELAXED_MIN));
    }

    #[tokio::test]
    async fn test_tempo_sorted_by_distance() {
        let with_tempo = |id: &str, tempo: f64| {
            tweak(id, |t| {
                if let Some(f) = t.audio_features.as_mut() {
                    f.tempo = tempo;
                }
            })
        };
        let base = track("ref");
        let catalog = catalog(vec![
            with_tempo("t128", 128.0),
            base.clone(),
            with_tempo("t119", 119.0),
            with_tempo("t150", 150.0),
            with_tempo("t113", 113.0),
        ]);

        let result = run(FilterMode::Tempo, &catalog, &reference(base), 5).await.unwrap();
        assert_eq!(ids(&result), vec!["t119", "t113", "t128"]);

        let distances: Vec<f64> = result
            .iter()
            .map(|t| (t.tempo().unwrap() - 120.0).abs())
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_strategies_are_idempotent() {
        let base = tweak("ref", |t| {
            t.genre_id = Some(1);
            t.artist_ids = vec![4];
        });
        let tracks: Vec<Track> = (0..20)
            .map(|i| {
                tweak(&format!("t{i:02}"), |t| {
                    t.genre_id = Some(1 + (i % 2));
                    t.artist_ids = vec![4 + (i % 3)];
                    t.popularity = (i * 7) % 100;
                    if let Some(f) = t.audio_features.as_mut() {
                        f.tempo = 110.0 + i as f64;
                        f.energy = 0.4 + (i as f64) * 0.03;
                    }
                })
            })
            .collect();
        let catalog = catalog(tracks);
        let reference = reference(base);

        for mode in FilterMode::ALL {
            let first = run(mode, &catalog, &reference, 4).await.unwrap();
            let second = run(mode, &catalog, &reference, 4).await.unwrap();
            assert_eq!(first, second, "mode {mode}");
            assert!(first.len() <= 4, "mode {mode}");
            assert!(first.iter().all(|t| !reference.is_self(t)), "mode {mode}");
        }
    }
}
