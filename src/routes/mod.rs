use std::{sync::Arc, time::Duration};

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    error::{AppError, AppResult},
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{
        catalog::CatalogSource, enrichment::MetadataProvider,
        recommendations::RecommendationEngine,
    },
};

pub mod recommendations;
pub mod tracks;

/// Shared handler state, built once at startup
pub struct AppState {
    pub engine: RecommendationEngine,
    /// `None` when no metadata service is configured
    pub metadata: Option<Arc<dyn MetadataProvider>>,
}

impl AppState {
    pub fn new(engine: RecommendationEngine, metadata: Option<Arc<dyn MetadataProvider>>) -> Self {
        Self { engine, metadata }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogSource> {
        self.engine.catalog()
    }

    pub fn metadata_provider(&self) -> AppResult<&Arc<dyn MetadataProvider>> {
        self.metadata
            .as_ref()
            .ok_or_else(|| AppError::ExternalApi("Metadata provider not configured".to_string()))
    }
}

/// Creates the application router with all routes and HTTP layers
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recommendations", post(recommendations::recommend))
        .route(
            "/recommendations/profile",
            post(recommendations::recommend_for_profile),
        )
        .route("/tracks/random", get(tracks::random))
        .route("/tracks/search", get(tracks::search))
        .route("/tracks/metadata", post(tracks::metadata_batch))
        .route("/tracks/:track_id/metadata", get(tracks::metadata))
}

async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
