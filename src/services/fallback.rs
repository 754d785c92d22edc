use crate::{
    error::{AppError, AppResult},
    models::Track,
    services::catalog::CatalogSource,
};

/// One uniformly random catalog track
///
/// Fails with [`AppError::NoData`] when the catalog is empty.
pub async fn random_track(catalog: &dyn CatalogSource) -> AppResult<Track> {
    let track = catalog
        .sample_random(1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NoData("catalog has no tracks to sample".to_string()))?;

    tracing::info!(track_id = %track.track_id, catalog = catalog.name(), "Serving random fallback track");
    Ok(track)
}
