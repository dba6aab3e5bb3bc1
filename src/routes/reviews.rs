use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId},
    models::{NewReview, Rating, Review},
    routes::{parse_movie_id, AppState},
};

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub rating: i32,
    #[serde(default)]
    pub review: String,
}

/// The caller's latest review of a movie, `null` when they never checked in
pub async fn get_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(movie_id): Path<String>,
) -> AppResult<Json<Option<Review>>> {
    let movie_id = parse_movie_id(&movie_id)?;
    let review = state.review_store.find_review(user.id(), movie_id).await?;
    Ok(Json(review))
}

/// Handler for checking in to a movie with a rating and optional text
pub async fn check_in(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    user: AuthUser,
    Path(movie_id): Path<String>,
    Json(request): Json<CheckInRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let movie_id = parse_movie_id(&movie_id)?;
    let rating = Rating::try_from(request.rating)?;

    tracing::info!(
        request_id = %request_id,
        user_id = %user.id(),
        movie_id,
        rating = rating.value(),
        "Processing check-in"
    );

    let review = state
        .review_store
        .create_review(NewReview {
            user_id: user.0,
            movie_id,
            rating,
            review: request.review,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(review)))
}
