use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::ReviewStore,
    error::AppResult,
    models::{MovieId, NewReview, Review},
};

/// Review store kept in process memory
///
/// Backs the router-level tests; the server itself always uses
/// `PgReviewStore`.
#[derive(Clone, Default)]
pub struct InMemoryReviewStore {
    reviews: Arc<RwLock<Vec<Review>>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully specified review, keeping its timestamp
    pub async fn insert(&self, review: Review) {
        self.reviews.write().await.push(review);
    }

    pub async fn len(&self) -> usize {
        self.reviews.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reviews.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn recent_positive_reviews(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Review>> {
        let reviews = self.reviews.read().await;

        let mut recent: Vec<Review> = reviews
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since && r.is_positive())
            .cloned()
            .collect();

        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);

        Ok(recent)
    }

    async fn reviewed_movie_ids(&self, user_id: &str) -> AppResult<HashSet<MovieId>> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.movie_id)
            .collect())
    }

    async fn find_review(&self, user_id: &str, movie_id: MovieId) -> AppResult<Option<Review>> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .iter()
            .filter(|r| r.user_id == user_id && r.movie_id == movie_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn create_review(&self, review: NewReview) -> AppResult<Review> {
        let stored = Review {
            id: Uuid::new_v4(),
            user_id: review.user_id,
            movie_id: review.movie_id,
            rating: review.rating.value(),
            review: review.review,
            created_at: Utc::now(),
        };

        self.reviews.write().await.push(stored.clone());
        Ok(stored)
    }
}
