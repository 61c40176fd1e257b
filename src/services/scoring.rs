use crate::models::{CatalogItem, PreferenceWeights, RecommendedProduct};

const DURABILITY_FACTOR: f64 = 0.30;
const REPAIRABILITY_FACTOR: f64 = 0.25;
const WARRANTY_FACTOR: f64 = 0.25;
const OVERALL_FACTOR: f64 = 0.20;

/// Uniform amplification applied to every personalized score. It keeps
/// personalized scores distinct from raw catalog scores and never changes order.
pub const PERSONALIZATION_BOOST: f64 = 1.1;

/// Maximum number of items returned by heuristic ranking
pub const MAX_RANKED: usize = 12;

/// Weighted score of one item. Missing dimension scores fall back to the
/// item's overall catalog score.
pub fn personalized_score(item: &CatalogItem, weights: &PreferenceWeights) -> f64 {
    let durability = item.durability_score.unwrap_or(item.overall_score);
    let repairability = item.repairability_score.unwrap_or(item.overall_score);
    let warranty = item.warranty_score.unwrap_or(item.overall_score);

    let weighted = durability * weights.durability * DURABILITY_FACTOR
        + repairability * weights.repairability * REPAIRABILITY_FACTOR
        + warranty * weights.warranty * WARRANTY_FACTOR
        + item.overall_score * weights.overall_preference * OVERALL_FACTOR;

    weighted * PERSONALIZATION_BOOST
}

/// Scores every candidate, sorts by score descending and keeps the top `MAX_RANKED`.
///
/// Ties keep the candidates' incoming order, so the result is reproducible for a
/// given input.
pub fn rank(candidates: Vec<CatalogItem>, weights: &PreferenceWeights) -> Vec<RecommendedProduct> {
    let mut scored: Vec<RecommendedProduct> = candidates
        .into_iter()
        .map(|item| {
            let score = personalized_score(&item, weights);
            RecommendedProduct {
                item,
                personalized_score: Some(score),
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.personalized_score
            .unwrap_or_default()
            .total_cmp(&a.personalized_score.unwrap_or_default())
    });
    scored.truncate(MAX_RANKED);
    scored
}
