use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{parse_limit, SearchPage, Track, TrackId, TrackMetadata},
    routes::AppState,
};

const DEFAULT_RANDOM_COUNT: usize = 10;
const MAX_RANDOM_COUNT: usize = 100;
const DEFAULT_SEARCH_LIMIT: usize = 20;
const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct RandomParams {
    pub count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl SearchParams {
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(parse_limit)
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .min(MAX_SEARCH_LIMIT)
    }

    fn offset(&self) -> usize {
        self.offset.as_deref().and_then(parse_limit).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct MetadataBatchRequest {
    #[serde(default)]
    pub track_ids: Vec<TrackId>,
}

fn random_count(params: &RandomParams) -> usize {
    params
        .count
        .as_deref()
        .and_then(parse_limit)
        .unwrap_or(DEFAULT_RANDOM_COUNT)
        .min(MAX_RANDOM_COUNT)
}

/// Handler for random catalog samples
pub async fn random(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RandomParams>,
) -> AppResult<Json<Vec<Track>>> {
    let tracks = state.catalog().sample_random(random_count(&params)).await?;
    Ok(Json(tracks))
}

/// Handler for catalog search by track or artist name
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchPage>> {
    let (limit, offset) = (params.limit(), params.offset());
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Ok(Json(SearchPage::empty(offset, limit)));
    }

    let page = state.catalog().search(query, limit, offset).await?;
    Ok(Json(page))
}

/// Handler for single-track metadata
pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Path(track_id): Path<String>,
) -> AppResult<Json<TrackMetadata>> {
    let provider = state.metadata_provider()?;
    let track_id = TrackId::new(track_id);

    provider
        .track_metadata(&track_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No metadata for track {}", track_id)))
}

/// Handler for batch metadata lookups
pub async fn metadata_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MetadataBatchRequest>,
) -> AppResult<Json<Vec<TrackMetadata>>> {
    let provider = state.metadata_provider()?;
    let metadata = provider.tracks_metadata(&request.track_ids).await?;
    Ok(Json(metadata))
}
