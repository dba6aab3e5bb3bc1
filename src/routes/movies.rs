use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{CountryCode, MovieCredits, MovieDetails, MoviePage, MovieSummary, WatchProvider},
    routes::{parse_movie_id, AppState},
};

/// Number of popular titles offered as search suggestions
const POPULAR_QUERY_COUNT: usize = 6;
/// Number of related movies shown on a movie page
const RELATED_MOVIE_COUNT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: String,
}

#[derive(Debug, Deserialize)]
pub struct WatchProvidersQuery {
    country: String,
}

#[derive(Debug, Serialize)]
pub struct PopularQueriesResponse {
    pub popular_queries: Vec<String>,
}

/// Handler for movie search
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<MoviePage>> {
    let page = state.movie_provider.search_movies(&params.q).await?;
    Ok(Json(page))
}

/// Lowercased titles of currently popular movies, used as search suggestions
pub async fn popular_queries(
    State(state): State<AppState>,
) -> AppResult<Json<PopularQueriesResponse>> {
    let page = state.movie_provider.popular_movies().await?;

    let popular_queries = page
        .results
        .into_iter()
        .take(POPULAR_QUERY_COUNT)
        .map(|movie| movie.title.to_lowercase())
        .collect();

    Ok(Json(PopularQueriesResponse { popular_queries }))
}

pub async fn details(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> AppResult<Json<MovieDetails>> {
    let movie_id = parse_movie_id(&movie_id)?;
    let details = state.movie_provider.movie_details(movie_id).await?;
    Ok(Json(details))
}

/// Movies related to a single movie, most popular first
pub async fn recommendations(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> AppResult<Json<Vec<MovieSummary>>> {
    let movie_id = parse_movie_id(&movie_id)?;
    let related = state.movie_provider.recommendations(movie_id).await?;
    Ok(Json(most_popular(related, RELATED_MOVIE_COUNT)))
}

pub async fn credits(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> AppResult<Json<MovieCredits>> {
    let movie_id = parse_movie_id(&movie_id)?;
    let credits = state.movie_provider.movie_credits(movie_id).await?;
    Ok(Json(credits))
}

/// Where a movie can be streamed, rented or bought in one country
///
/// Responds with `null` when the provider has no offers for the country.
pub async fn watch_providers(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
    Query(params): Query<WatchProvidersQuery>,
) -> AppResult<Json<Option<Vec<WatchProvider>>>> {
    let movie_id = parse_movie_id(&movie_id)?;
    let country: CountryCode = params.country.parse()?;

    let mut response = state.movie_provider.watch_providers(movie_id).await?;

    let providers = response
        .results
        .remove(country.as_str())
        .map(|offers| offers.merged());

    tracing::debug!(
        movie_id,
        country = %country,
        providers = providers.as_ref().map(Vec::len).unwrap_or(0),
        "Watch providers resolved"
    );

    Ok(Json(providers))
}

fn most_popular(mut movies: Vec<MovieSummary>, limit: usize) -> Vec<MovieSummary> {
    movies.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));
    movies.truncate(limit);
    movies
}
