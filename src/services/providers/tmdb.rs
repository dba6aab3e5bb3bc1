/// TMDB API provider
///
/// Talks to the v3 REST API with a v4 read access token sent as a bearer
/// token. List, details, credits and watch-provider responses are cached in
/// Redis; recommendations are always fetched live.
///
/// API Flow:
/// 1. Search: /search/movie?query=
/// 2. Movie page: /movie/{id}, /movie/{id}/credits, /movie/{id}/watch/providers
/// 3. Home feed: /movie/{id}/recommendations per seed movie
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        MovieCredits, MovieDetails, MovieId, MoviePage, MovieSummary, WatchProvidersResponse,
    },
    services::providers::MovieProvider,
};
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const SEARCH_CACHE_TTL: u64 = 3600; // 1 hour
const POPULAR_CACHE_TTL: u64 = 21600; // 6 hours
const MOVIE_CACHE_TTL: u64 = 86400; // 1 day
const PROVIDERS_CACHE_TTL: u64 = 43200; // 12 hours

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    access_token: String,
    api_url: String,
    cache: Cache,
}

impl TmdbProvider {
    pub fn new(
        cache: Cache,
        access_token: String,
        api_url: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            access_token,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// GETs a TMDB endpoint and deserializes the JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<T> {
        let response = self
            .http_client
            .get(self.endpoint(path))
            .bearer_auth(&self.access_token)
            .query(&[("language", "en-US")])
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(path, status, &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, path = %path, "Failed to deserialize TMDB response");
            AppError::ExternalApi(format!("Failed to parse TMDB response: {}", e))
        })
    }
}

/// Maps a non-success TMDB status to an application error
fn status_error(path: &str, status: StatusCode, body: &str) -> AppError {
    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound(format!("TMDB resource {}", path));
    }

    AppError::ExternalApi(format!("TMDB API returned status {}: {}", status, body))
}

#[async_trait::async_trait]
impl MovieProvider for TmdbProvider {
    async fn search_movies(&self, query: &str) -> AppResult<MoviePage> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query must be at least 1 character long".to_string(),
            ));
        }

        cached!(
            self.cache,
            CacheKey::MovieSearch(query.to_string()),
            SEARCH_CACHE_TTL,
            async move {
                let page: MoviePage = self
                    .get_json(
                        "/search/movie",
                        &[("query", query), ("include_adult", "false"), ("page", "1")],
                    )
                    .await?;

                tracing::info!(
                    query = %query,
                    results = page.results.len(),
                    provider = "tmdb",
                    "Movie search completed"
                );

                Ok::<_, AppError>(page)
            }
        )
    }

    async fn popular_movies(&self) -> AppResult<MoviePage> {
        cached!(
            self.cache,
            CacheKey::PopularMovies,
            POPULAR_CACHE_TTL,
            self.get_json::<MoviePage>("/movie/popular", &[("page", "1")])
        )
    }

    async fn movie_details(&self, movie_id: MovieId) -> AppResult<MovieDetails> {
        cached!(
            self.cache,
            CacheKey::MovieDetails(movie_id),
            MOVIE_CACHE_TTL,
            self.get_json::<MovieDetails>(&format!("/movie/{}", movie_id), &[])
        )
    }

    async fn movie_credits(&self, movie_id: MovieId) -> AppResult<MovieCredits> {
        cached!(
            self.cache,
            CacheKey::MovieCredits(movie_id),
            MOVIE_CACHE_TTL,
            self.get_json::<MovieCredits>(&format!("/movie/{}/credits", movie_id), &[])
        )
    }

    async fn recommendations(&self, movie_id: MovieId) -> AppResult<Vec<MovieSummary>> {
        let page: MoviePage = self
            .get_json(&format!("/movie/{}/recommendations", movie_id), &[("page", "1")])
            .await?;

        tracing::debug!(
            movie_id,
            results = page.results.len(),
            provider = "tmdb",
            "Recommendations fetched"
        );

        Ok(page.results)
    }

    async fn watch_providers(&self, movie_id: MovieId) -> AppResult<WatchProvidersResponse> {
        cached!(
            self.cache,
            CacheKey::WatchProviders(movie_id),
            PROVIDERS_CACHE_TTL,
            self.get_json::<WatchProvidersResponse>(
                &format!("/movie/{}/watch/providers", movie_id),
                &[]
            )
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
