use axum::{extract::State, Extension, Json};
use chrono::Utc;

use crate::{
    middleware::{AuthUser, RequestId},
    models::RecommendationFeed,
    routes::AppState,
    services::recommendations::next_refresh_after,
};

/// Handler for the personalized home feed
///
/// Never fails because of an upstream: a failing review store or metadata
/// provider yields an empty list so the page still renders.
pub async fn feed(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
) -> Json<RecommendationFeed> {
    let movies = match state.recommendations.recommend_for_user(user.id()).await {
        Ok(movies) => movies,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                user_id = %user.id(),
                error = %e,
                "Recommendations unavailable, serving empty feed"
            );
            Vec::new()
        }
    };

    Json(RecommendationFeed {
        movies,
        next_refresh: next_refresh_after(Utc::now()),
    })
}
