use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{hash_map::Entry, HashMap, HashSet};
use std::sync::Arc;

use crate::{
    db::ReviewStore,
    error::{AppError, AppResult},
    models::{MovieId, MovieSummary, Review},
    services::providers::MovieProvider,
};

/// Maximum number of recent reviews used as seeds
pub const MOVIES_TO_FETCH: usize = 10;
/// Maximum number of movies returned to the home feed
pub const RECOMMENDATION_COUNT: usize = 4;
/// Only reviews younger than this many days are seeds
pub const LOOKBACK_DAYS: i64 = 30;
/// Upper bound of the inclusion probability of a non-forced candidate
pub const MAX_CHANCE: f64 = 0.8;
/// Daily recommendations roll over at this hour (UTC)
pub const REFRESH_HOUR_UTC: i64 = 9;

/// What to do when fetching recommendations for one seed fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedFailurePolicy {
    /// Any failing seed fails the whole computation
    #[default]
    FailFast,
    /// A failing seed contributes no candidates
    SkipFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationSettings {
    pub movies_to_fetch: usize,
    pub recommendation_count: usize,
    pub lookback_days: i64,
    pub max_chance: f64,
    pub seed_failure_policy: SeedFailurePolicy,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            movies_to_fetch: MOVIES_TO_FETCH,
            recommendation_count: RECOMMENDATION_COUNT,
            lookback_days: LOOKBACK_DAYS,
            max_chance: MAX_CHANCE,
            seed_failure_policy: SeedFailurePolicy::default(),
        }
    }
}

/// A candidate movie together with the number of times it was recommended
/// across all seeds
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub movie: MovieSummary,
    pub occurrence_count: usize,
}

/// Builds the personalized "recommended for you" list of the home feed
///
/// Seeds are the user's recent 4 and 5 star reviews. Every seed's movie is
/// sent to the metadata provider for related movies; movies recommended by
/// several seeds rank higher, and a weighted random sample of the ranking is
/// returned so repeated visits see some variety.
pub struct RecommendationService {
    reviews: Arc<dyn ReviewStore>,
    provider: Arc<dyn MovieProvider>,
    settings: RecommendationSettings,
}

impl RecommendationService {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        provider: Arc<dyn MovieProvider>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            reviews,
            provider,
            settings,
        }
    }

    /// Recommendations for `user_id` using the current time and a freshly
    /// seeded random generator
    pub async fn recommend_for_user(&self, user_id: &str) -> AppResult<Vec<MovieSummary>> {
        let mut rng = StdRng::from_entropy();
        self.recommend_for_user_with(user_id, Utc::now(), &mut rng)
            .await
    }

    /// Recommendations for `user_id` as of `now`, drawing from `rng`
    ///
    /// Errors of the review store always propagate. Errors of the metadata
    /// provider propagate according to the configured `SeedFailurePolicy`.
    pub async fn recommend_for_user_with<R: Rng + Send + ?Sized>(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> AppResult<Vec<MovieSummary>> {
        let since = now - Duration::days(self.settings.lookback_days);

        let (seeds, reviewed_ids) = tokio::try_join!(
            self.reviews
                .recent_positive_reviews(user_id, since, self.settings.movies_to_fetch),
            self.reviews.reviewed_movie_ids(user_id),
        )?;

        if seeds.is_empty() {
            tracing::debug!(user_id = %user_id, "No recent positive reviews to seed recommendations");
            return Ok(Vec::new());
        }

        let per_seed = self.fetch_seed_candidates(&seeds, &reviewed_ids).await?;
        let ranked = rank_candidates(per_seed);
        let picked = sample_recommendations(
            &ranked,
            self.settings.recommendation_count,
            self.settings.max_chance,
            rng,
        );

        tracing::info!(
            user_id = %user_id,
            seeds = seeds.len(),
            candidates = ranked.len(),
            picked = picked.len(),
            provider = self.provider.name(),
            "Recommendations computed"
        );

        Ok(picked)
    }

    /// Fetches the provider's recommendations for every seed concurrently,
    /// dropping movies the user already reviewed. The result keeps seed order.
    async fn fetch_seed_candidates(
        &self,
        seeds: &[Review],
        reviewed_ids: &HashSet<MovieId>,
    ) -> AppResult<Vec<Vec<MovieSummary>>> {
        let tasks: Vec<_> = seeds
            .iter()
            .map(|seed| {
                let provider = Arc::clone(&self.provider);
                let movie_id = seed.movie_id;
                let task = tokio::spawn(async move { provider.recommendations(movie_id).await });
                (movie_id, task)
            })
            .collect();

        let mut per_seed = Vec::with_capacity(tasks.len());
        let mut tasks = tasks.into_iter();

        while let Some((movie_id, task)) = tasks.next() {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(AppError::Internal(e.to_string())),
            };

            match result {
                Ok(candidates) => per_seed.push(
                    candidates
                        .into_iter()
                        .filter(|movie| !reviewed_ids.contains(&movie.id))
                        .collect(),
                ),
                Err(e) => match self.settings.seed_failure_policy {
                    SeedFailurePolicy::FailFast => {
                        tracing::error!(seed_movie_id = movie_id, error = %e, "Seed recommendations failed");
                        for (_, pending) in tasks {
                            pending.abort();
                        }
                        return Err(e);
                    }
                    SeedFailurePolicy::SkipFailed => {
                        tracing::warn!(seed_movie_id = movie_id, error = %e, "Skipping failed seed");
                        per_seed.push(Vec::new());
                    }
                },
            }
        }

        Ok(per_seed)
    }
}

/// Merges per-seed candidate lists into a ranking
///
/// Every occurrence of a movie id counts once towards its occurrence count,
/// and the last occurrence provides the movie record. Higher counts rank
/// first. Equal counts rank the *less* popular movie first; equal popularity
/// falls back to ascending id.
pub fn rank_candidates(per_seed: Vec<Vec<MovieSummary>>) -> Vec<ScoredCandidate> {
    let mut scored: HashMap<MovieId, ScoredCandidate> = HashMap::new();

    for movie in per_seed.into_iter().flatten() {
        match scored.entry(movie.id) {
            Entry::Occupied(mut entry) => {
                let candidate = entry.get_mut();
                candidate.occurrence_count += 1;
                candidate.movie = movie;
            }
            Entry::Vacant(entry) => {
                entry.insert(ScoredCandidate {
                    movie,
                    occurrence_count: 1,
                });
            }
        }
    }

    let mut ranked: Vec<ScoredCandidate> = scored.into_values().collect();
    ranked.sort_by(|a, b| {
        b.occurrence_count
            .cmp(&a.occurrence_count)
            .then_with(|| a.movie.popularity.total_cmp(&b.movie.popularity))
            .then_with(|| a.movie.id.cmp(&b.movie.id))
    });

    ranked
}

/// Probability of picking a candidate that is not forced in
pub fn inclusion_chance(occurrence_count: usize, max_count: usize, max_chance: f64) -> f64 {
    if max_count == 0 {
        return 0.0;
    }
    (occurrence_count as f64 / max_count as f64).min(max_chance)
}

/// Walks the ranking and picks at most `count` movies
///
/// A candidate is forced in when the candidates left (itself included) are
/// no more than the open slots, so the result is full whenever the ranking
/// holds at least `count` movies. Any other candidate is picked when its
/// inclusion chance beats a uniform draw from `rng`; skipped candidates are
/// not reconsidered.
pub fn sample_recommendations<R: Rng + ?Sized>(
    ranked: &[ScoredCandidate],
    count: usize,
    max_chance: f64,
    rng: &mut R,
) -> Vec<MovieSummary> {
    let Some(max_count) = ranked.iter().map(|c| c.occurrence_count).max() else {
        return Vec::new();
    };

    let mut picked = Vec::with_capacity(count.min(ranked.len()));

    for (index, candidate) in ranked.iter().enumerate() {
        let open_slots = count - picked.len();
        if open_slots == 0 {
            break;
        }

        let remaining = ranked.len() - index;
        if remaining <= open_slots {
            picked.push(candidate.movie.clone());
            continue;
        }

        let chance = inclusion_chance(candidate.occurrence_count, max_count, max_chance);
        if chance > rng.gen::<f64>() {
            picked.push(candidate.movie.clone());
        }
    }

    picked
}

/// Next time the daily recommendations roll over: today at 09:00 UTC, or
/// tomorrow when that moment has already passed
pub fn next_refresh_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let refresh_today = now.date_naive().and_time(NaiveTime::default()).and_utc()
        + Duration::hours(REFRESH_HOUR_UTC);

    if now > refresh_today {
        refresh_today + Duration::days(1)
    } else {
        refresh_today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockReviewStore;
    use crate::services::providers::MockMovieProvider;
    use chrono::TimeZone;
    use rand::rngs::mock::StepRng;
    use uuid::Uuid;

    /// Every draw is 0.0: every candidate with a positive chance is picked
    fn always_pick() -> StepRng {
        StepRng::new(0, 0)
    }

    /// Every draw is just below 1.0: only forced candidates are picked
    fn never_pick() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    fn movie(id: MovieId, popularity: f64) -> MovieSummary {
        MovieSummary {
            id,
            title: format!("Movie {}", id),
            poster_path: Some(format!("/{}.jpg", id)),
            release_date: "2020-01-01".to_string(),
            popularity,
            vote_average: 7.0,
        }
    }

    fn scored(id: MovieId, popularity: f64, occurrence_count: usize) -> ScoredCandidate {
        ScoredCandidate {
            movie: movie(id, popularity),
            occurrence_count,
        }
    }

    fn seed(movie_id: MovieId, now: DateTime<Utc>) -> Review {
        Review {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            movie_id,
            rating: 5,
            review: String::new(),
            created_at: now - Duration::days(1),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn ids(movies: &[MovieSummary]) -> Vec<MovieId> {
        movies.iter().map(|m| m.id).collect()
    }

    fn service(
        reviews: MockReviewStore,
        provider: MockMovieProvider,
        settings: RecommendationSettings,
    ) -> RecommendationService {
        RecommendationService::new(Arc::new(reviews), Arc::new(provider), settings)
    }

    fn review_store(seeds: Vec<Review>, reviewed: Vec<MovieId>) -> MockReviewStore {
        let mut reviews = MockReviewStore::new();
        reviews
            .expect_recent_positive_reviews()
            .returning(move |_, _, _| Ok(seeds.clone()));
        reviews
            .expect_reviewed_movie_ids()
            .returning(move |_| Ok(reviewed.iter().copied().collect()));
        reviews
    }

    fn provider_with(recommendations: HashMap<MovieId, Vec<MovieSummary>>) -> MockMovieProvider {
        let mut provider = MockMovieProvider::new();
        provider
            .expect_recommendations()
            .returning(move |id| Ok(recommendations.get(&id).cloned().unwrap_or_default()));
        provider.expect_name().return_const("mock");
        provider
    }

    #[test]
    fn test_rank_by_occurrence_count() {
        let ranked = rank_candidates(vec![
            vec![movie(1, 90.0), movie(2, 10.0)],
            vec![movie(2, 10.0), movie(3, 50.0)],
        ]);

        assert_eq!(ranked[0].movie.id, 2);
        assert_eq!(ranked[0].occurrence_count, 2);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn test_rank_ties_prefer_less_popular_movie() {
        // Intentional: on equal counts the less popular movie comes first.
        let ranked = rank_candidates(vec![vec![movie(1, 80.0), movie(2, 5.0), movie(3, 40.0)]]);

        let ranked_ids: Vec<MovieId> = ranked.iter().map(|c| c.movie.id).collect();
        assert_eq!(ranked_ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_rank_counts_duplicates_within_one_seed() {
        let ranked = rank_candidates(vec![vec![movie(7, 1.0), movie(7, 1.0)], vec![movie(8, 1.0)]]);

        assert_eq!(ranked[0].movie.id, 7);
        assert_eq!(ranked[0].occurrence_count, 2);
    }

    #[test]
    fn test_rank_keeps_last_snapshot_of_movie() {
        let mut updated = movie(1, 12.0);
        updated.title = "Updated".to_string();

        let ranked = rank_candidates(vec![vec![movie(1, 12.0)], vec![updated]]);
        assert_eq!(ranked[0].movie.title, "Updated");
    }

    #[test]
    fn test_inclusion_chance_is_capped() {
        assert_eq!(inclusion_chance(5, 5, MAX_CHANCE), 0.8);
        assert_eq!(inclusion_chance(1, 4, MAX_CHANCE), 0.25);
        assert_eq!(inclusion_chance(3, 3, 1.0), 1.0);
    }

    #[test]
    fn test_inclusion_chance_range() {
        for max_count in 1..=10 {
            for count in 1..=max_count {
                let chance = inclusion_chance(count, max_count, MAX_CHANCE);
                assert!(chance > 0.0 && chance <= MAX_CHANCE);
            }
        }
    }

    #[test]
    fn test_sample_empty_ranking() {
        let picked = sample_recommendations(&[], RECOMMENDATION_COUNT, MAX_CHANCE, &mut always_pick());
        assert!(picked.is_empty());
    }

    #[test]
    fn test_sample_forces_everything_when_fewer_candidates_than_slots() {
        let ranked = vec![scored(1, 1.0, 1), scored(2, 2.0, 1)];

        let picked = sample_recommendations(&ranked, RECOMMENDATION_COUNT, MAX_CHANCE, &mut never_pick());
        assert_eq!(ids(&picked), vec![1, 2]);
    }

    #[test]
    fn test_sample_fills_tail_when_draws_fail() {
        let ranked: Vec<ScoredCandidate> = (1..=6).map(|id| scored(id, id as f64, 1)).collect();

        let picked = sample_recommendations(&ranked, RECOMMENDATION_COUNT, MAX_CHANCE, &mut never_pick());
        assert_eq!(ids(&picked), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_sample_takes_top_when_draws_succeed() {
        let ranked: Vec<ScoredCandidate> = (1..=6).map(|id| scored(id, id as f64, 1)).collect();

        let picked = sample_recommendations(&ranked, RECOMMENDATION_COUNT, MAX_CHANCE, &mut always_pick());
        assert_eq!(ids(&picked), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sample_weighs_chance_by_occurrence_ratio() {
        // Every draw is 0.5: count 4 of 4 (chance 0.8) is picked, count 1 of 4
        // (chance 0.25) is not, and the tail is forced in.
        let mut half = StepRng::new(1 << 63, 0);
        let mut ranked = vec![scored(1, 1.0, 4)];
        ranked.extend((2..=7).map(|id| scored(id, id as f64, 1)));

        let picked = sample_recommendations(&ranked, RECOMMENDATION_COUNT, MAX_CHANCE, &mut half);
        assert_eq!(ids(&picked), vec![1, 5, 6, 7]);
    }

    #[test]
    fn test_sample_is_full_and_distinct_for_any_draws() {
        let ranked: Vec<ScoredCandidate> = (1..=12)
            .map(|id| scored(id, id as f64, (13 - id as usize) / 3 + 1))
            .collect();

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = sample_recommendations(&ranked, RECOMMENDATION_COUNT, MAX_CHANCE, &mut rng);

            assert_eq!(picked.len(), RECOMMENDATION_COUNT);
            let unique: HashSet<MovieId> = picked.iter().map(|m| m.id).collect();
            assert_eq!(unique.len(), picked.len());
        }
    }

    #[test]
    fn test_sample_is_reproducible_with_same_seed() {
        let ranked: Vec<ScoredCandidate> = (1..=10).map(|id| scored(id, 1.0, 1)).collect();

        let first = sample_recommendations(&ranked, RECOMMENDATION_COUNT, MAX_CHANCE, &mut StdRng::seed_from_u64(42));
        let second = sample_recommendations(&ranked, RECOMMENDATION_COUNT, MAX_CHANCE, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_no_qualifying_reviews_yields_empty_list() {
        let mut provider = MockMovieProvider::new();
        provider.expect_recommendations().never();

        let service = service(
            review_store(vec![], vec![1, 2]),
            provider,
            RecommendationSettings::default(),
        );

        let picked = service
            .recommend_for_user_with("alice", fixed_now(), &mut always_pick())
            .await
            .unwrap();
        assert!(picked.is_empty());
    }

    #[tokio::test]
    async fn test_single_seed_with_two_candidates_returns_both() {
        let now = fixed_now();
        let provider = provider_with(HashMap::from([(100, vec![movie(1, 5.0), movie(2, 9.0)])]));

        let service = service(
            review_store(vec![seed(100, now)], vec![100]),
            provider,
            RecommendationSettings::default(),
        );

        let picked = service
            .recommend_for_user_with("alice", now, &mut never_pick())
            .await
            .unwrap();
        assert_eq!(ids(&picked), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_shared_candidate_ranks_first() {
        let now = fixed_now();
        let provider = provider_with(HashMap::from([
            (100, vec![movie(1, 1.0), movie(9, 999.0), movie(2, 2.0)]),
            (200, vec![movie(3, 3.0), movie(9, 999.0), movie(4, 4.0)]),
        ]));

        let service = service(
            review_store(vec![seed(100, now), seed(200, now)], vec![100, 200]),
            provider,
            RecommendationSettings::default(),
        );

        let picked = service
            .recommend_for_user_with("alice", now, &mut always_pick())
            .await
            .unwrap();
        assert_eq!(ids(&picked), vec![9, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reviewed_movies_are_excluded() {
        let now = fixed_now();
        let provider = provider_with(HashMap::from([
            (100, vec![movie(5, 1.0), movie(6, 1.0)]),
            (200, vec![movie(5, 1.0), movie(7, 1.0)]),
        ]));

        // 5 is recommended by both seeds but the user already reviewed it.
        let service = service(
            review_store(vec![seed(100, now), seed(200, now)], vec![100, 200, 5]),
            provider,
            RecommendationSettings::default(),
        );

        let picked = service
            .recommend_for_user_with("alice", now, &mut always_pick())
            .await
            .unwrap();
        assert_eq!(ids(&picked), vec![6, 7]);
    }

    #[tokio::test]
    async fn test_output_never_exceeds_recommendation_count() {
        let now = fixed_now();
        let provider = provider_with(HashMap::from([
            (100, (1..=8).map(|id| movie(id, id as f64)).collect()),
            (200, (5..=12).map(|id| movie(id, id as f64)).collect()),
        ]));

        let service = service(
            review_store(vec![seed(100, now), seed(200, now)], vec![]),
            provider,
            RecommendationSettings::default(),
        );

        for rng_seed in 0..20 {
            let picked = service
                .recommend_for_user_with("alice", now, &mut StdRng::seed_from_u64(rng_seed))
                .await
                .unwrap();
            assert_eq!(picked.len(), RECOMMENDATION_COUNT);
        }
    }

    #[tokio::test]
    async fn test_failed_seed_fails_whole_computation_by_default() {
        let now = fixed_now();
        let mut provider = MockMovieProvider::new();
        provider.expect_recommendations().returning(|id| {
            if id == 200 {
                Err(AppError::ExternalApi("TMDB unavailable".to_string()))
            } else {
                Ok(vec![movie(1, 1.0)])
            }
        });
        provider.expect_name().return_const("mock");

        let service = service(
            review_store(vec![seed(100, now), seed(200, now)], vec![]),
            provider,
            RecommendationSettings::default(),
        );

        let result = service
            .recommend_for_user_with("alice", now, &mut always_pick())
            .await;
        tokio_test::assert_err!(result);
    }

    #[tokio::test]
    async fn test_failed_seed_is_skipped_when_configured() {
        let now = fixed_now();
        let mut provider = MockMovieProvider::new();
        provider.expect_recommendations().returning(|id| {
            if id == 200 {
                Err(AppError::ExternalApi("TMDB unavailable".to_string()))
            } else {
                Ok(vec![movie(1, 1.0), movie(2, 2.0)])
            }
        });
        provider.expect_name().return_const("mock");

        let settings = RecommendationSettings {
            seed_failure_policy: SeedFailurePolicy::SkipFailed,
            ..RecommendationSettings::default()
        };
        let service = service(
            review_store(vec![seed(100, now), seed(200, now)], vec![]),
            provider,
            settings,
        );

        let picked = tokio_test::assert_ok!(
            service
                .recommend_for_user_with("alice", now, &mut always_pick())
                .await
        );
        assert_eq!(ids(&picked), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_review_store_failure_propagates() {
        let mut reviews = MockReviewStore::new();
        reviews
            .expect_recent_positive_reviews()
            .returning(|_, _, _| Err(AppError::Internal("connection refused".to_string())));
        reviews
            .expect_reviewed_movie_ids()
            .returning(|_| Ok(HashSet::new()));

        let service = service(reviews, MockMovieProvider::new(), RecommendationSettings::default());

        let result = service
            .recommend_for_user_with("alice", fixed_now(), &mut always_pick())
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_review_store_is_queried_with_lookback_and_limit() {
        let now = fixed_now();
        let mut reviews = MockReviewStore::new();
        reviews
            .expect_recent_positive_reviews()
            .withf(move |user_id, since, limit| {
                user_id.to_string() == "alice"
                    && *since == now - Duration::days(LOOKBACK_DAYS)
                    && *limit == MOVIES_TO_FETCH
            })
            .times(1)
            .returning(|_, _, _| Ok(vec![]));
        reviews
            .expect_reviewed_movie_ids()
            .times(1)
            .returning(|_| Ok(HashSet::new()));

        let service = service(reviews, MockMovieProvider::new(), RecommendationSettings::default());

        let picked = service
            .recommend_for_user_with("alice", now, &mut always_pick())
            .await
            .unwrap();
        assert!(picked.is_empty());
    }

    #[test]
    fn test_next_refresh_later_today() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 7, 30, 0).unwrap();
        assert_eq!(
            next_refresh_after(now),
            Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_refresh_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 6, 30, 9, 0, 1).unwrap();
        assert_eq!(
            next_refresh_after(now),
            Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap()
        );
    }
}
