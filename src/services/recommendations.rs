use std::{sync::Arc, time::Instant};

use crate::{
    error::AppResult,
    models::{FilterMode, Recommendation, ReferenceVector, Track, DEFAULT_LIMIT},
    services::{catalog::CatalogSource, fallback, strategies},
};

/// Recommends tracks similar to a reference track
///
/// The reference is validated once. Any reference that cannot be scored, and any strategy
/// run that produces nothing, is answered with a single random catalog track instead.
#[derive(Clone)]
pub struct RecommendationEngine {
    catalog: Arc<dyn CatalogSource>,
}

impl RecommendationEngine {
    pub fn new(catalog: Arc<dyn CatalogSource>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogSource> {
        &self.catalog
    }

    /// Recommends at most `limit` tracks for `reference` using `mode`
    ///
    /// A `limit` of zero is treated as [`DEFAULT_LIMIT`]. Catalog errors propagate.
    pub async fn recommend(
        &self,
        reference: Track,
        mode: FilterMode,
        limit: usize,
    ) -> AppResult<Recommendation> {
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

        let reference = match ReferenceVector::try_from(reference) {
            Ok(reference) => reference,
            Err(reason) => {
                tracing::warn!(mode = %mode, reason = %reason, "Reference cannot be scored");
                return self.fallback().await;
            }
        };

        let started = Instant::now();
        let tracks = strategies::run(mode, &self.catalog, &reference, limit).await?;

        if tracks.is_empty() {
            tracing::info!(
                mode = %mode,
                reference = %reference.id(),
                "No candidates found, falling back"
            );
            return self.fallback().await;
        }

        tracing::info!(
            mode = %mode,
            reference = %reference.id(),
            count = tracks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommendations ready"
        );

        Ok(Recommendation::Ranked(tracks))
    }

    async fn fallback(&self) -> AppResult<Recommendation> {
        fallback::random_track(self.catalog.as_ref())
            .await
            .map(Recommendation::Fallback)
    }
}
