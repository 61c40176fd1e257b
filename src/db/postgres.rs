use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    db::Catalog,
    error::AppResult,
    models::{CatalogFilter, CatalogItem, ProductId, RatedInteraction, ReviewedItem, UserSignals},
};

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.category_id, p.brand_id, p.overall_score, \
     p.durability_score, p.repairability_score, p.warranty_score, p.price";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Catalog backed by the `products`, `favorites` and `reviews` tables
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    #[sqlx(flatten)]
    item: CatalogItem,
    durability_rating: Option<f64>,
    repairability_rating: Option<f64>,
    warranty_rating: Option<f64>,
    value_rating: Option<f64>,
    overall_rating: Option<f64>,
}

impl From<ReviewRow> for ReviewedItem {
    fn from(row: ReviewRow) -> Self {
        ReviewedItem {
            item: row.item,
            ratings: RatedInteraction {
                durability_rating: row.durability_rating,
                repairability_rating: row.repairability_rating,
                warranty_rating: row.warranty_rating,
                value_rating: row.value_rating,
                overall_rating: row.overall_rating,
            },
        }
    }
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds the published-products query for a filter
    fn published_query(filter: &CatalogFilter, limit: usize) -> QueryBuilder<'static, Postgres> {
        let mut query = QueryBuilder::new(format!(
            "SELECT {} FROM products p WHERE p.published = true",
            PRODUCT_COLUMNS
        ));

        if let Some(categories) = &filter.category_ids {
            query
                .push(" AND p.category_id = ANY(")
                .push_bind(categories.clone())
                .push(")");
        }
        if let Some(brands) = &filter.brand_ids {
            query
                .push(" AND p.brand_id = ANY(")
                .push_bind(brands.clone())
                .push(")");
        }
        if !filter.exclude_ids.is_empty() {
            query
                .push(" AND NOT (p.id = ANY(")
                .push_bind(filter.exclude_ids.clone())
                .push("))");
        }
        if let Some(range) = filter.price_range {
            if let Some(min) = range.min {
                query.push(" AND p.price >= ").push_bind(min);
            }
            if let Some(max) = range.max {
                query.push(" AND p.price <= ").push_bind(max);
            }
        }

        query
            .push(" ORDER BY p.overall_score DESC, p.id LIMIT ")
            .push_bind(limit as i64);
        query
    }
}

#[async_trait::async_trait]
impl Catalog for PgCatalog {
    async fn query_published(
        &self,
        filter: &CatalogFilter,
        limit: usize,
    ) -> AppResult<Vec<CatalogItem>> {
        let items = Self::published_query(filter, limit)
            .build_query_as::<CatalogItem>()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(results = items.len(), limit, "Catalog query completed");

        Ok(items)
    }

    async fn find_published(&self, id: ProductId) -> AppResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {} FROM products p WHERE p.id = $1 AND p.published = true",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn user_signals(&self, user_id: Uuid) -> AppResult<UserSignals> {
        let favorites = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {} FROM favorites f JOIN products p ON p.id = f.product_id \
             WHERE f.user_id = $1 ORDER BY f.created_at DESC",
            PRODUCT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let reviews = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {}, r.durability_rating, r.repairability_rating, r.warranty_rating, \
             r.value_rating, r.overall_rating \
             FROM reviews r JOIN products p ON p.id = r.product_id \
             WHERE r.user_id = $1 ORDER BY r.created_at DESC",
            PRODUCT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            favorites = favorites.len(),
            reviews = reviews.len(),
            "Loaded user signals"
        );

        Ok(UserSignals {
            favorites,
            reviews: reviews.into_iter().map(ReviewedItem::from).collect(),
        })
    }
}
