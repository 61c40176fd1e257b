use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CatalogFilter, CatalogItem, ProductId, UserBehaviorSnapshot, UserSignals},
};

pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::{InMemoryCatalog, MemorySessionStore};
pub use postgres::{create_pool, PgCatalog};
pub use redis::{create_redis_client, RedisSessionStore, SessionWriterHandle};

/// Read access to the published product catalog and to users' explicit signals
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Published items matching `filter`, ordered by overall score descending
    async fn query_published(
        &self,
        filter: &CatalogFilter,
        limit: usize,
    ) -> AppResult<Vec<CatalogItem>>;

    /// A single published item, if it exists
    async fn find_published(&self, id: ProductId) -> AppResult<Option<CatalogItem>>;

    /// Favorited and reviewed items for a user
    async fn user_signals(&self, user_id: Uuid) -> AppResult<UserSignals>;
}

/// Durable key-value storage for session snapshots
///
/// Callers treat every error as non-fatal: a tracker keeps running on its
/// in-memory snapshot when the store misbehaves.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_key: &str) -> AppResult<Option<UserBehaviorSnapshot>>;

    async fn save(&self, session_key: &str, snapshot: &UserBehaviorSnapshot) -> AppResult<()>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}
