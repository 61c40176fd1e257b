use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{
    db::Catalog,
    error::{AppError, AppResult},
    models::{
        CatalogFilter, CatalogItem, PreferenceWeights, RecommendationMode, RecommendationRequest,
        RecommendationResponse, RecommendedProduct, StatedPreferences, UserBehaviorSnapshot,
        UserSignals,
    },
    services::{
        candidates::{self, InterestProfile, TOP_RATED_LIMIT},
        preferences,
        providers::CompletionProvider,
        rerank::{self, MAX_PROMPT_CANDIDATES},
        scoring,
    },
};

/// How a list of recommendations was ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    AiRerank,
    Heuristic,
}

/// Output of the personalized path for a single user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalizedRecommendations {
    pub recommendations: Vec<RecommendedProduct>,
    pub strategy: RankingStrategy,
    /// Set when the AI path was skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PersonalizedRecommendations {
    fn empty() -> Self {
        Self {
            recommendations: Vec::new(),
            strategy: RankingStrategy::Heuristic,
            note: None,
        }
    }
}

/// Everything known about the requester for one request
struct Requester<'a> {
    signals: UserSignals,
    weights: PreferenceWeights,
    profile: InterestProfile,
    behavior: Option<&'a UserBehaviorSnapshot>,
}

impl Requester<'_> {
    fn has_signal(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// Orders catalog items for a visitor.
///
/// Each ranking first tries the AI re-rank and falls back to the deterministic
/// weighted score when AI is unavailable, slow, failing, or unusable. Only
/// catalog failures reach the caller as errors.
pub struct RecommendationEngine {
    catalog: Arc<dyn Catalog>,
    completion: Arc<dyn CompletionProvider>,
    ai_timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        completion: Arc<dyn CompletionProvider>,
        ai_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            completion,
            ai_timeout,
        }
    }

    /// Preference weights derived from a user's reviews.
    ///
    /// A user without reviews, or one the catalog does not know, gets the
    /// neutral weights rather than an error.
    pub async fn preference_weights(&self, user_id: Uuid) -> AppResult<PreferenceWeights> {
        let signals = self.catalog.user_signals(user_id).await?;
        Ok(preferences::analyze(&signals.ratings()))
    }

    /// Personalized ranking for a user with explicit signals.
    ///
    /// Candidates come from the user's favorited and reviewed categories and
    /// brands, minus everything they already touched, including products in
    /// `behavior` when a session snapshot is supplied. The shortlist is then
    /// ordered by the AI re-rank, or by the weighted heuristic when that fails;
    /// `strategy` and `note` say which.
    ///
    /// Returns an empty list for a user without favorites or reviews; callers
    /// show top-rated items instead.
    pub async fn personalized_for_user(
        &self,
        user_id: Uuid,
        behavior: Option<&UserBehaviorSnapshot>,
    ) -> AppResult<PersonalizedRecommendations> {
        let requester = self.requester(Some(user_id), behavior).await?;
        self.personalized(&requester).await
    }

    async fn personalized(&self, requester: &Requester<'_>) -> AppResult<PersonalizedRecommendations> {
        if !requester.has_signal() {
            tracing::debug!("No explicit signals, skipping personalized retrieval");
            return Ok(PersonalizedRecommendations::empty());
        }

        let candidates = candidates::retrieve(self.catalog.as_ref(), &requester.profile).await?;
        if candidates.is_empty() {
            return Ok(PersonalizedRecommendations::empty());
        }

        let context = describe_requester(requester);
        Ok(self.rank(&context, candidates, &requester.weights).await)
    }

    /// Serves a recommendation request in whichever mode it selects.
    ///
    /// - `reference_product_id` set: other items from the reference product's
    ///   category, `NotFound` if it is not published.
    /// - `preferences` set: items matching the stated categories and budget.
    /// - neither: the personalized path, or top-rated items on a cold start.
    ///
    /// `behavior` is the session snapshot to exclude seen products with and to
    /// describe in the AI prompt. Only catalog failures surface as errors.
    #[tracing::instrument(
        skip_all,
        fields(user_id = ?request.user_id, reference = ?request.reference_product_id)
    )]
    pub async fn recommend(
        &self,
        request: &RecommendationRequest,
        behavior: Option<&UserBehaviorSnapshot>,
    ) -> AppResult<RecommendationResponse> {
        let start = Instant::now();
        let requester = self.requester(request.user_id, behavior).await?;

        let response = match (&request.reference_product_id, &request.preferences) {
            (Some(reference_id), _) => self.product_based(*reference_id, &requester).await?,
            (None, Some(stated)) => self.preference_based(stated, &requester).await?,
            (None, None) => self.trending(&requester).await?,
        };

        tracing::info!(
            mode = ?response.mode,
            personalized = response.personalized,
            results = response.recommendations.len(),
            fallback = response.note.is_some(),
            processing_time_ms = start.elapsed().as_millis(),
            "Recommendations served"
        );

        Ok(response)
    }

    async fn product_based(
        &self,
        reference_id: Uuid,
        requester: &Requester<'_>,
    ) -> AppResult<RecommendationResponse> {
        let reference = self
            .catalog
            .find_published(reference_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", reference_id)))?;

        let filter = CatalogFilter::categories(vec![reference.category_id])
            .excluding(requester.profile.exclude_ids.iter().copied())
            .excluding([reference.id]);
        let candidates = self
            .catalog
            .query_published(&filter, MAX_PROMPT_CANDIDATES)
            .await?;

        let context = format!(
            "{}\n{}",
            describe_reference(&reference),
            describe_requester(requester)
        );
        let ranked = self.rank(&context, candidates, &requester.weights).await;

        Ok(RecommendationResponse {
            recommendations: ranked.recommendations,
            mode: RecommendationMode::ProductBased,
            personalized: requester.has_signal(),
            note: ranked.note,
        })
    }

    async fn preference_based(
        &self,
        stated: &StatedPreferences,
        requester: &Requester<'_>,
    ) -> AppResult<RecommendationResponse> {
        let filter = CatalogFilter {
            category_ids: stated.categories.clone().filter(|c| !c.is_empty()),
            ..Default::default()
        }
        .excluding(requester.profile.exclude_ids.iter().copied())
        .within(stated.price_range);

        let candidates = self
            .catalog
            .query_published(&filter, MAX_PROMPT_CANDIDATES)
            .await?;

        let context = format!(
            "{}\n{}",
            describe_stated(stated),
            describe_requester(requester)
        );
        let ranked = self.rank(&context, candidates, &requester.weights).await;

        Ok(RecommendationResponse {
            recommendations: ranked.recommendations,
            mode: RecommendationMode::PreferenceBased,
            personalized: requester.has_signal(),
            note: ranked.note,
        })
    }

    async fn trending(&self, requester: &Requester<'_>) -> AppResult<RecommendationResponse> {
        let personalized = self.personalized(requester).await?;

        if !personalized.recommendations.is_empty() {
            return Ok(RecommendationResponse {
                recommendations: personalized.recommendations,
                mode: RecommendationMode::Trending,
                personalized: true,
                note: personalized.note,
            });
        }

        // Cold start, or nothing left that the user has not already seen
        let exclude = requester
            .behavior
            .map(|b| b.touched_products())
            .unwrap_or_default();
        let top = candidates::top_rated(self.catalog.as_ref(), exclude, TOP_RATED_LIMIT).await?;

        Ok(RecommendationResponse {
            recommendations: top.into_iter().map(RecommendedProduct::from).collect(),
            mode: RecommendationMode::Trending,
            personalized: false,
            note: requester
                .has_signal()
                .then(|| "No unseen personalized candidates; showing top-rated products".to_string()),
        })
    }

    /// Loads signals for an optional user and derives weights and interests
    async fn requester<'a>(
        &self,
        user_id: Option<Uuid>,
        behavior: Option<&'a UserBehaviorSnapshot>,
    ) -> AppResult<Requester<'a>> {
        let signals = match user_id {
            Some(id) => self.catalog.user_signals(id).await?,
            None => UserSignals::default(),
        };
        let weights = preferences::analyze(&signals.ratings());
        let session_touched = behavior.map(|b| b.touched_products()).unwrap_or_default();
        let profile = InterestProfile::from_signals(&signals, session_touched);

        Ok(Requester {
            signals,
            weights,
            profile,
            behavior,
        })
    }

    /// Orders candidates: AI re-rank first, weighted heuristic on any failure
    async fn rank(
        &self,
        context: &str,
        candidates: Vec<CatalogItem>,
        weights: &PreferenceWeights,
    ) -> PersonalizedRecommendations {
        if candidates.is_empty() {
            return PersonalizedRecommendations::empty();
        }

        match rerank::rerank(self.completion.as_ref(), self.ai_timeout, context, &candidates).await
        {
            Ok(ranked) => PersonalizedRecommendations {
                recommendations: ranked.into_iter().map(RecommendedProduct::from).collect(),
                strategy: RankingStrategy::AiRerank,
                note: None,
            },
            Err(e) => {
                tracing::info!(
                    provider = self.completion.name(),
                    reason = %e,
                    candidates = candidates.len(),
                    "AI re-rank unavailable, using heuristic scoring"
                );
                PersonalizedRecommendations {
                    recommendations: scoring::rank(candidates, weights),
                    strategy: RankingStrategy::Heuristic,
                    note: Some(format!("Ranked by heuristic scoring: {}", e)),
                }
            }
        }
    }
}

fn describe_reference(item: &CatalogItem) -> String {
    format!(
        "The shopper is looking at \"{}\" (overall score {:.1}/10) and wants similar products that are at least as durable.",
        item.name, item.overall_score
    )
}

fn describe_stated(stated: &StatedPreferences) -> String {
    let mut parts = vec!["The shopper described what they want.".to_string()];
    if let Some(use_case) = stated.use_case.as_deref().filter(|u| !u.trim().is_empty()) {
        parts.push(format!("Use case: {}.", use_case.trim()));
    }
    if let Some(features) = stated.priority_features.as_ref().filter(|f| !f.is_empty()) {
        parts.push(format!("Priority features: {}.", features.join(", ")));
    }
    if let Some(range) = stated.price_range {
        match (range.min, range.max) {
            (Some(min), Some(max)) => parts.push(format!("Budget: ${:.0}-${:.0}.", min, max)),
            (None, Some(max)) => parts.push(format!("Budget: up to ${:.0}.", max)),
            (Some(min), None) => parts.push(format!("Budget: from ${:.0}.", min)),
            (None, None) => {}
        }
    }
    parts.join(" ")
}

/// Natural-language summary of the requester's signals for the AI prompt
fn describe_requester(requester: &Requester<'_>) -> String {
    let mut lines = Vec::new();

    let favorites: Vec<&str> = requester
        .signals
        .favorites
        .iter()
        .take(10)
        .map(|i| i.name.as_str())
        .collect();
    if !favorites.is_empty() {
        lines.push(format!("Favorited: {}.", favorites.join(", ")));
    }

    let reviewed: Vec<&str> = requester
        .signals
        .reviews
        .iter()
        .take(10)
        .map(|r| r.item.name.as_str())
        .collect();
    if !reviewed.is_empty() {
        lines.push(format!("Reviewed: {}.", reviewed.join(", ")));
    }

    if !requester.weights.is_neutral() {
        let w = &requester.weights;
        lines.push(format!(
            "Cares most about {}. Relative emphasis (0.5-1.0): durability {:.2}, repairability {:.2}, warranty {:.2}, value {:.2}. Overall satisfaction {:.2}.",
            w.strongest_dimension(),
            w.durability,
            w.repairability,
            w.warranty,
            w.value,
            w.overall_preference
        ));
    }

    if let Some(behavior) = requester.behavior {
        let queries = behavior.recent_queries(5);
        if !queries.is_empty() {
            lines.push(format!("Recently searched for: {}.", queries.join(", ")));
        }
        if !behavior.product_views.is_empty() {
            lines.push(format!(
                "Viewed {} products this session.",
                behavior.product_views.len()
            ));
        }
    }

    if lines.is_empty() {
        "No prior history is known for this shopper.".to_string()
    } else {
        lines.join("\n")
    }
}
