use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::{Catalog, SessionStore},
    error::{AppError, AppResult},
    models::{
        CatalogFilter, CatalogItem, ProductId, RatedInteraction, ReviewedItem,
        UserBehaviorSnapshot, UserSignals,
    },
};

#[derive(Default)]
struct CatalogInner {
    products: Vec<CatalogItem>,
    favorites: HashMap<Uuid, Vec<ProductId>>,
    reviews: HashMap<Uuid, Vec<(ProductId, RatedInteraction)>>,
}

/// Catalog held entirely in memory, for local runs and tests
#[derive(Default)]
pub struct InMemoryCatalog {
    inner: RwLock<CatalogInner>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a published product, replacing any product with the same id
    pub async fn insert_product(&self, item: CatalogItem) {
        let mut inner = self.inner.write().await;
        inner.products.retain(|p| p.id != item.id);
        inner.products.push(item);
    }

    pub async fn add_favorite(&self, user_id: Uuid, product_id: ProductId) {
        let mut inner = self.inner.write().await;
        let favorites = inner.favorites.entry(user_id).or_default();
        if !favorites.contains(&product_id) {
            favorites.push(product_id);
        }
    }

    pub async fn add_review(&self, user_id: Uuid, product_id: ProductId, ratings: RatedInteraction) {
        let mut inner = self.inner.write().await;
        inner
            .reviews
            .entry(user_id)
            .or_default()
            .push((product_id, ratings));
    }
}

#[async_trait::async_trait]
impl Catalog for InMemoryCatalog {
    async fn query_published(
        &self,
        filter: &CatalogFilter,
        limit: usize,
    ) -> AppResult<Vec<CatalogItem>> {
        let inner = self.inner.read().await;
        let mut items: Vec<CatalogItem> = inner
            .products
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            b.overall_score
                .total_cmp(&a.overall_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(limit);
        Ok(items)
    }

    async fn find_published(&self, id: ProductId) -> AppResult<Option<CatalogItem>> {
        let inner = self.inner.read().await;
        Ok(inner.products.iter().find(|p| p.id == id).cloned())
    }

    async fn user_signals(&self, user_id: Uuid) -> AppResult<UserSignals> {
        let inner = self.inner.read().await;
        let lookup = |id: &ProductId| inner.products.iter().find(|p| p.id == *id).cloned();

        let favorites = inner
            .favorites
            .get(&user_id)
            .map(|ids| ids.iter().filter_map(lookup).collect())
            .unwrap_or_default();

        let reviews = inner
            .reviews
            .get(&user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(id, ratings)| {
                        lookup(id).map(|item| ReviewedItem {
                            item,
                            ratings: ratings.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(UserSignals { favorites, reviews })
    }
}

/// Session store keeping serialized snapshots in a map
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_key: &str) -> AppResult<Option<UserBehaviorSnapshot>> {
        let entries = self.entries.read().await;
        match entries.get(session_key) {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| AppError::Persistence(format!("Snapshot deserialization error: {}", e))),
            None => Ok(None),
        }
    }

    async fn save(&self, session_key: &str, snapshot: &UserBehaviorSnapshot) -> AppResult<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| AppError::Persistence(format!("Snapshot serialization error: {}", e)))?;
        self.entries
            .write()
            .await
            .insert(session_key.to_string(), json);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
