use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;

use crate::{
    error::AppResult,
    models::{MovieId, NewReview, Rating, Review},
};

/// Storage for movie check-ins
///
/// The recommendation feed reads from this store; the check-in endpoints
/// write to it.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReviewStore: Send + Sync {
    /// Most recent reviews by `user_id` rated 4 or 5 and created at or after
    /// `since`, newest first, at most `limit` of them.
    async fn recent_positive_reviews(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Review>>;

    /// Every movie the user has ever reviewed, regardless of rating
    async fn reviewed_movie_ids(&self, user_id: &str) -> AppResult<HashSet<MovieId>>;

    /// The user's latest review of a movie, if any
    async fn find_review(&self, user_id: &str, movie_id: MovieId) -> AppResult<Option<Review>>;

    async fn create_review(&self, review: NewReview) -> AppResult<Review>;
}

/// PostgreSQL-backed review store
#[derive(Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReviewStore for PgReviewStore {
    async fn recent_positive_reviews(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT id, user_id, movie_id, rating, review, created_at
            FROM movie_reviews
            WHERE user_id = $1 AND created_at >= $2 AND rating = ANY($3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(&Rating::POSITIVE[..])
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(reviews)
    }

    async fn reviewed_movie_ids(&self, user_id: &str) -> AppResult<HashSet<MovieId>> {
        let ids = sqlx::query_scalar::<_, MovieId>(
            r#"
            SELECT DISTINCT movie_id
            FROM movie_reviews
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn find_review(&self, user_id: &str, movie_id: MovieId) -> AppResult<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(
            r#"
            SELECT id, user_id, movie_id, rating, review, created_at
            FROM movie_reviews
            WHERE user_id = $1 AND movie_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(review)
    }

    async fn create_review(&self, review: NewReview) -> AppResult<Review> {
        // Users are provisioned by the identity provider; make sure a row
        // exists before the foreign key is checked.
        sqlx::query("INSERT INTO users_table (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(&review.user_id)
            .execute(&self.pool)
            .await?;

        let stored = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO movie_reviews (user_id, movie_id, rating, review)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, movie_id, rating, review, created_at
            "#,
        )
        .bind(&review.user_id)
        .bind(review.movie_id)
        .bind(review.rating.value())
        .bind(&review.review)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            user_id = %stored.user_id,
            movie_id = stored.movie_id,
            rating = stored.rating,
            "Review stored"
        );

        Ok(stored)
    }
}
