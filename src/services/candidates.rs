use std::collections::{BTreeSet, HashSet};

use uuid::Uuid;

use crate::{
    db::Catalog,
    error::AppResult,
    models::{CatalogFilter, CatalogItem, ProductId, UserSignals},
};

/// Candidates drawn from the user's preferred categories
pub const PRIMARY_LIMIT: usize = 8;
/// Below this many primary candidates, preferred brands are used to top up
pub const SUPPLEMENT_THRESHOLD: usize = 6;
/// Maximum candidates added from preferred brands
pub const SUPPLEMENT_LIMIT: usize = 4;
/// Size of the top-rated list used for cold starts
pub const TOP_RATED_LIMIT: usize = 12;

/// What the user has already interacted with and where their interest lies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestProfile {
    pub exclude_ids: BTreeSet<ProductId>,
    pub categories: Vec<Uuid>,
    pub brands: Vec<Uuid>,
}

impl InterestProfile {
    /// Builds the profile from explicit signals plus any extra ids to exclude
    /// (e.g. products touched in the current session)
    pub fn from_signals(signals: &UserSignals, also_exclude: impl IntoIterator<Item = ProductId>) -> Self {
        let mut exclude_ids: BTreeSet<ProductId> = signals.items().map(|i| i.id).collect();
        exclude_ids.extend(also_exclude);

        Self {
            exclude_ids,
            categories: distinct(signals.items().map(|i| i.category_id)),
            brands: distinct(signals.items().map(|i| i.brand_id)),
        }
    }
}

/// Keeps first occurrences, in order
fn distinct(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Published items the user has not interacted with, from their preferred
/// categories, topped up from their preferred brands when categories run thin.
///
/// The category and brand queries are independent reads and run concurrently.
/// A failed brand query only loses the top-up; a failed category query fails
/// the whole retrieval.
pub async fn retrieve(catalog: &dyn Catalog, profile: &InterestProfile) -> AppResult<Vec<CatalogItem>> {
    let excluded: Vec<ProductId> = profile.exclude_ids.iter().copied().collect();

    let primary_filter = if profile.categories.is_empty() {
        CatalogFilter::default()
    } else {
        CatalogFilter::categories(profile.categories.clone())
    }
    .excluding(excluded.iter().copied());

    let brand_filter = CatalogFilter::brands(profile.brands.clone()).excluding(excluded.iter().copied());
    let want_brands = !profile.brands.is_empty();

    let (primary, supplement) = tokio::join!(
        catalog.query_published(&primary_filter, PRIMARY_LIMIT),
        async {
            if want_brands {
                // Over-fetch so the top-up survives overlap with primary results
                Some(
                    catalog
                        .query_published(&brand_filter, SUPPLEMENT_LIMIT + PRIMARY_LIMIT)
                        .await,
                )
            } else {
                None
            }
        }
    );

    let mut candidates = primary?;

    if candidates.len() < SUPPLEMENT_THRESHOLD {
        match supplement {
            Some(Ok(brand_items)) => {
                let chosen: HashSet<ProductId> = candidates.iter().map(|c| c.id).collect();
                candidates.extend(
                    brand_items
                        .into_iter()
                        .filter(|item| !chosen.contains(&item.id))
                        .take(SUPPLEMENT_LIMIT),
                );
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Brand supplement query failed, continuing without it");
            }
            None => {}
        }
    }

    tracing::debug!(
        categories = profile.categories.len(),
        brands = profile.brands.len(),
        excluded = excluded.len(),
        candidates = candidates.len(),
        "Candidates retrieved"
    );

    Ok(candidates)
}

/// Highest-rated published items, for visitors without any signal.
///
/// `exclude` usually holds what the visitor touched this session, so a cold
/// start still avoids showing a product they just looked at.
pub async fn top_rated(
    catalog: &dyn Catalog,
    exclude: impl IntoIterator<Item = ProductId>,
    limit: usize,
) -> AppResult<Vec<CatalogItem>> {
    catalog
        .query_published(&CatalogFilter::default().excluding(exclude), limit)
        .await
}
