use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod behavior;
pub mod preferences;
pub mod recommendation;

pub use behavior::{
    ComparisonEvent, FavoriteAction, InteractionEvent, InteractionKind, ProductView, SearchEvent,
    UserBehaviorSnapshot, ViewSource,
};
pub use preferences::{PreferenceWeights, RatedInteraction};
pub use recommendation::{
    RecommendationMode, RecommendationRequest, RecommendationResponse, RecommendedProduct,
    StatedPreferences,
};

pub type ProductId = Uuid;

// ============================================================================
// Catalog Types
// ============================================================================

/// A published catalog product as seen by the recommendation core.
///
/// Scores are on the catalog's 0-10 scale. Per-dimension scores are optional;
/// ranking falls back to `overall_score` when one is missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct CatalogItem {
    pub id: ProductId,
    pub name: String,
    pub category_id: Uuid,
    pub brand_id: Uuid,
    pub overall_score: f64,
    #[serde(default)]
    pub durability_score: Option<f64>,
    #[serde(default)]
    pub repairability_score: Option<f64>,
    #[serde(default)]
    pub warranty_score: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Inclusive price bounds; either side may be open
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl PriceRange {
    /// Items without a price never match a bounded range
    pub fn contains(&self, price: Option<f64>) -> bool {
        if self.min.is_none() && self.max.is_none() {
            return true;
        }
        match price {
            Some(p) => self.min.map_or(true, |min| p >= min) && self.max.map_or(true, |max| p <= max),
            None => false,
        }
    }
}

/// Filter for published catalog queries. Results are always ordered by
/// `overall_score` descending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFilter {
    pub category_ids: Option<Vec<Uuid>>,
    pub brand_ids: Option<Vec<Uuid>>,
    pub exclude_ids: Vec<ProductId>,
    pub price_range: Option<PriceRange>,
}

impl CatalogFilter {
    pub fn categories(ids: Vec<Uuid>) -> Self {
        Self {
            category_ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn brands(ids: Vec<Uuid>) -> Self {
        Self {
            brand_ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = ProductId>) -> Self {
        self.exclude_ids.extend(ids);
        self
    }

    pub fn within(mut self, range: Option<PriceRange>) -> Self {
        self.price_range = range;
        self
    }

    /// Whether an item passes every clause of this filter
    pub fn matches(&self, item: &CatalogItem) -> bool {
        if self.exclude_ids.contains(&item.id) {
            return false;
        }
        if let Some(categories) = &self.category_ids {
            if !categories.contains(&item.category_id) {
                return false;
            }
        }
        if let Some(brands) = &self.brand_ids {
            if !brands.contains(&item.brand_id) {
                return false;
            }
        }
        self.price_range.map_or(true, |range| range.contains(item.price))
    }
}

/// A product the user reviewed, with the ratings they gave it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewedItem {
    pub item: CatalogItem,
    pub ratings: RatedInteraction,
}

/// Explicit signals a user has left in the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserSignals {
    pub favorites: Vec<CatalogItem>,
    pub reviews: Vec<ReviewedItem>,
}

impl UserSignals {
    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty() && self.reviews.is_empty()
    }

    /// Every catalog item the user has favorited or reviewed
    pub fn items(&self) -> impl Iterator<Item = &CatalogItem> {
        self.favorites
            .iter()
            .chain(self.reviews.iter().map(|r| &r.item))
    }

    pub fn ratings(&self) -> Vec<RatedInteraction> {
        self.reviews.iter().map(|r| r.ratings.clone()).collect()
    }
}
