use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::AppResult,
    models::{
        limit_from_json, parse_limit, FilterMode, Recommendation, Track, TrackPayload,
        DEFAULT_LIMIT,
    },
    routes::AppState,
    services::profile::{ProfileWeighting, TasteProfile},
};

/// Query string options; these win over the same fields in the body
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationParams {
    pub limit: Option<String>,
    pub filter: Option<String>,
}

/// Reference track with optional loosely typed `limit` and `filter`
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(flatten)]
    pub track: TrackPayload,
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default)]
    pub filter: Option<Value>,
}

/// Liked tracks, oldest first, that are averaged into a synthetic reference
#[derive(Debug, Default, Deserialize)]
pub struct ProfileRecommendationRequest {
    #[serde(default)]
    pub liked: Vec<TrackPayload>,
    #[serde(default)]
    pub weighting: ProfileWeighting,
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default)]
    pub filter: Option<Value>,
}

fn resolve_options(
    params: &RecommendationParams,
    body_limit: Option<&Value>,
    body_filter: Option<&Value>,
) -> (FilterMode, usize) {
    let limit = params
        .limit
        .as_deref()
        .and_then(parse_limit)
        .or_else(|| limit_from_json(body_limit))
        .unwrap_or(DEFAULT_LIMIT);

    let filter = params
        .filter
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .or_else(|| body_filter.and_then(Value::as_str));

    (FilterMode::from_param(filter), limit)
}

/// Handler for the recommendations endpoint
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecommendationParams>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<Recommendation>> {
    let (mode, limit) = resolve_options(&params, request.limit.as_ref(), request.filter.as_ref());
    let reference = request.track.into_track();

    let recommendation = state.engine.recommend(reference, mode, limit).await?;
    tracing::debug!(
        returned = recommendation.len(),
        fallback = recommendation.is_fallback(),
        "Recommendation response"
    );
    Ok(Json(recommendation))
}

/// Handler for profile-based recommendations
pub async fn recommend_for_profile(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecommendationParams>,
    Json(request): Json<ProfileRecommendationRequest>,
) -> AppResult<Json<Recommendation>> {
    let (mode, limit) = resolve_options(&params, request.limit.as_ref(), request.filter.as_ref());

    let liked: Vec<Track> = request
        .liked
        .into_iter()
        .map(TrackPayload::into_track)
        .collect();
    let profile = TasteProfile::build(&liked, request.weighting);
    tracing::info!(
        liked = liked.len(),
        accepted = profile.accepted,
        weighting = ?request.weighting,
        "Built taste profile"
    );

    let recommendation = state
        .engine
        .recommend(profile.ideal_track(), mode, limit)
        .await?;
    Ok(Json(recommendation))
}
