pub mod movie;
pub mod review;
pub mod watch_provider;

pub use movie::{
    CastMember, CrewMember, Genre, MovieCredits, MovieDetails, MoviePage, MovieSummary,
    RecommendationFeed,
};
pub use review::{NewReview, Rating, Review};
pub use watch_provider::{
    CountryCode, CountryWatchProviders, OfferType, ProviderOffer, WatchProvider,
    WatchProvidersResponse,
};

/// TMDB movie identifier
pub type MovieId = i32;
