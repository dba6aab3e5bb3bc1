use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::ReviewStore,
    error::{AppError, AppResult},
    middleware::{make_span_with_request_id, request_id_middleware},
    models::MovieId,
    services::{MovieProvider, RecommendationService, RecommendationSettings},
};

pub mod movies;
pub mod recommendations;
pub mod reviews;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub movie_provider: Arc<dyn MovieProvider>,
    pub review_store: Arc<dyn ReviewStore>,
    pub recommendations: Arc<RecommendationService>,
}

impl AppState {
    pub fn new(
        movie_provider: Arc<dyn MovieProvider>,
        review_store: Arc<dyn ReviewStore>,
        settings: RecommendationSettings,
    ) -> Self {
        let recommendations = Arc::new(RecommendationService::new(
            Arc::clone(&review_store),
            Arc::clone(&movie_provider),
            settings,
        ));

        Self {
            movie_provider,
            review_store,
            recommendations,
        }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", get(recommendations::feed))
        .route("/movies/search", get(movies::search))
        .route("/movies/popular-queries", get(movies::popular_queries))
        .route("/movies/:movie_id", get(movies::details))
        .route(
            "/movies/:movie_id/recommendations",
            get(movies::recommendations),
        )
        .route("/movies/:movie_id/credits", get(movies::credits))
        .route(
            "/movies/:movie_id/watch-providers",
            get(movies::watch_providers),
        )
        .route("/movies/:movie_id/review", get(reviews::get_review))
        .route("/movies/:movie_id/reviews", post(reviews::check_in))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Parses a movie id path segment
pub(crate) fn parse_movie_id(raw: &str) -> AppResult<MovieId> {
    raw.parse::<MovieId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid movie id: {}", raw)))
}
