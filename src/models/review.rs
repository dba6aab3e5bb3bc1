use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MovieId;
use crate::error::AppError;

/// A user's check-in of a movie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub user_id: String,
    pub movie_id: MovieId,
    pub rating: i32,
    pub review: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Whether this review counts as a recommendation seed
    pub fn is_positive(&self) -> bool {
        Rating::POSITIVE.contains(&self.rating)
    }
}

/// Star rating between 1 and 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 5;

    /// Ratings that make a review a recommendation seed
    pub const POSITIVE: [i32; 2] = [4, 5];

    pub fn value(self) -> i32 {
        self.0 as i32
    }
}

impl TryFrom<i32> for Rating {
    type Error = AppError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(AppError::InvalidInput(format!(
                "Rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }
}

impl From<Rating> for i32 {
    fn from(rating: Rating) -> Self {
        rating.value()
    }
}

/// Validated check-in waiting to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub user_id: String,
    pub movie_id: MovieId,
    pub rating: Rating,
    pub review: String,
}
