use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use uuid::Uuid;

use super::ProductId;

/// Maximum number of interaction events retained per session
pub const MAX_INTERACTIONS: usize = 1000;

/// Kind of a logged interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    ViewStart,
    ViewEnd,
    Search,
    SearchClick,
    Compare,
    Favorite,
    /// Free-form interaction reported by the host (e.g. "click", "share")
    Generic(String),
}

impl InteractionKind {
    /// Parses a host-supplied interaction name. Unknown names become `Generic`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "view_start" => InteractionKind::ViewStart,
            "view_end" => InteractionKind::ViewEnd,
            "search" => InteractionKind::Search,
            "search_click" => InteractionKind::SearchClick,
            "compare" => InteractionKind::Compare,
            "favorite" => InteractionKind::Favorite,
            other => InteractionKind::Generic(other.to_string()),
        }
    }
}

impl Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionKind::ViewStart => write!(f, "view_start"),
            InteractionKind::ViewEnd => write!(f, "view_end"),
            InteractionKind::Search => write!(f, "search"),
            InteractionKind::SearchClick => write!(f, "search_click"),
            InteractionKind::Compare => write!(f, "compare"),
            InteractionKind::Favorite => write!(f, "favorite"),
            InteractionKind::Generic(name) => write!(f, "{}", name),
        }
    }
}

/// One entry in the append-only interaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    /// A product id, or a comma-joined list of ids for multi-product events
    pub target: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Where a product view was opened from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSource {
    Search,
    Category,
    Recommendation,
    Direct,
}

impl Display for ViewSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewSource::Search => write!(f, "search"),
            ViewSource::Category => write!(f, "category"),
            ViewSource::Recommendation => write!(f, "recommendation"),
            ViewSource::Direct => write!(f, "direct"),
        }
    }
}

/// A completed product view. Only created once the view has closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    pub product_id: ProductId,
    /// When the view started
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    pub source: ViewSource,
    pub scroll_depth_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    /// Lowercased and trimmed
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub results_shown: u32,
    pub clicked_results: Vec<ProductId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEvent {
    pub product_ids: BTreeSet<ProductId>,
    pub timestamp: DateTime<Utc>,
    /// Zero until the comparison is explicitly ended
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteAction {
    Add,
    Remove,
}

/// Everything tracked for one session, persisted as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBehaviorSnapshot {
    pub session_id: Uuid,
    #[serde(default)]
    pub product_views: Vec<ProductView>,
    #[serde(default)]
    pub searches: Vec<SearchEvent>,
    #[serde(default)]
    pub comparisons: Vec<ComparisonEvent>,
    #[serde(default)]
    pub favorites: BTreeSet<ProductId>,
    #[serde(default)]
    pub time_spent_by_product: HashMap<ProductId, f64>,
    #[serde(default)]
    pub interactions: Vec<InteractionEvent>,
}

impl Default for UserBehaviorSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl UserBehaviorSnapshot {
    /// Creates an empty snapshot with a fresh session id
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            product_views: Vec::new(),
            searches: Vec::new(),
            comparisons: Vec::new(),
            favorites: BTreeSet::new(),
            time_spent_by_product: HashMap::new(),
            interactions: Vec::new(),
        }
    }

    /// Appends an interaction, evicting the oldest entries beyond `MAX_INTERACTIONS`
    pub fn push_interaction(&mut self, event: InteractionEvent) {
        self.interactions.push(event);
        if self.interactions.len() > MAX_INTERACTIONS {
            let overflow = self.interactions.len() - MAX_INTERACTIONS;
            self.interactions.drain(..overflow);
        }
    }

    /// Products this session has viewed, compared or favorited
    pub fn touched_products(&self) -> BTreeSet<ProductId> {
        let mut ids: BTreeSet<ProductId> = self.favorites.iter().copied().collect();
        ids.extend(self.product_views.iter().map(|v| v.product_id));
        for comparison in &self.comparisons {
            ids.extend(comparison.product_ids.iter().copied());
        }
        ids
    }

    /// Products ordered by cumulative view time, longest first
    pub fn most_viewed(&self, limit: usize) -> Vec<(ProductId, f64)> {
        let mut entries: Vec<(ProductId, f64)> = self
            .time_spent_by_product
            .iter()
            .map(|(id, secs)| (*id, *secs))
            .collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }

    /// Most recent distinct search queries, newest first
    pub fn recent_queries(&self, limit: usize) -> Vec<&str> {
        let mut queries: Vec<&str> = Vec::new();
        for search in self.searches.iter().rev() {
            if !queries.contains(&search.query.as_str()) {
                queries.push(&search.query);
            }
            if queries.len() == limit {
                break;
            }
        }
        queries
    }
}
