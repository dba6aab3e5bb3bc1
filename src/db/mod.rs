pub mod memory;
pub mod postgres;
pub mod redis;
pub mod reviews;

pub use memory::InMemoryReviewStore;
pub use postgres::{create_pool, run_migrations};
pub use self::redis::create_redis_client;
pub use self::redis::Cache;
pub use self::redis::CacheKey;
pub use self::redis::CacheWriterHandle;
pub use reviews::{PgReviewStore, ReviewStore};

#[cfg(test)]
pub use reviews::MockReviewStore;
