/// Movie metadata provider abstraction
///
/// The recommendation feed, search and movie pages all read movie data
/// through this trait, so tests and alternative metadata sources can be
/// swapped in without touching the HTTP layer.
use crate::{
    error::AppResult,
    models::{MovieCredits, MovieDetails, MovieId, MoviePage, MovieSummary, WatchProvidersResponse},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for movie metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieProvider: Send + Sync {
    /// Search movies by title
    async fn search_movies(&self, query: &str) -> AppResult<MoviePage>;

    /// First page of currently popular movies
    async fn popular_movies(&self) -> AppResult<MoviePage>;

    async fn movie_details(&self, movie_id: MovieId) -> AppResult<MovieDetails>;

    async fn movie_credits(&self, movie_id: MovieId) -> AppResult<MovieCredits>;

    /// Movies the provider recommends to viewers of `movie_id`
    ///
    /// Never cached: the home feed relies on fresh reads.
    async fn recommendations(&self, movie_id: MovieId) -> AppResult<Vec<MovieSummary>>;

    /// Watch providers of a movie for every country the provider knows about
    async fn watch_providers(&self, movie_id: MovieId) -> AppResult<WatchProvidersResponse>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
