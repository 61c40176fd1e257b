use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CatalogItem, PriceRange, ProductId, UserBehaviorSnapshot};

/// Preferences a visitor states explicitly (e.g. through a quiz)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatedPreferences {
    #[serde(default)]
    pub categories: Option<Vec<Uuid>>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub use_case: Option<String>,
    #[serde(default)]
    pub priority_features: Option<Vec<String>>,
}

/// Body of a recommendation request.
///
/// `reference_product_id` selects product-based mode, `preferences` selects
/// preference-based mode, and neither selects trending mode. Like every payload
/// of the API, including the embedded `behavior_data` snapshot, it is snake_case.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub reference_product_id: Option<ProductId>,
    #[serde(default)]
    pub preferences: Option<StatedPreferences>,
    /// Inline session behavior; takes precedence over `session_key`
    #[serde(default)]
    pub behavior_data: Option<UserBehaviorSnapshot>,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationMode {
    ProductBased,
    PreferenceBased,
    Trending,
}

/// A catalog item, optionally annotated with its personalized score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedProduct {
    #[serde(flatten)]
    pub item: CatalogItem,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub personalized_score: Option<f64>,
}

impl From<CatalogItem> for RecommendedProduct {
    fn from(item: CatalogItem) -> Self {
        Self {
            item,
            personalized_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendedProduct>,
    pub mode: RecommendationMode,
    pub personalized: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
}
