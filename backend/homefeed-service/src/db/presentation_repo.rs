use super::PresentationStore;
use crate::error::Result;
use crate::models::{GeoPoint, Presentation, PublishFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

const PRESENTATION_COLUMNS: &str = "id, creator_id, title, goal, description, categories, keywords, \
     created_at, updated_at, is_published, is_deleted, view_count, latitude, longitude";

#[derive(Debug, sqlx::FromRow)]
struct PresentationRow {
    id: Uuid,
    creator_id: Uuid,
    title: String,
    goal: Option<String>,
    description: Option<String>,
    categories: Vec<String>,
    keywords: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    is_published: bool,
    is_deleted: bool,
    view_count: i64,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<PresentationRow> for Presentation {
    fn from(row: PresentationRow) -> Self {
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };
        Presentation {
            id: row.id,
            creator_id: row.creator_id,
            title: row.title,
            goal: row.goal,
            description: row.description,
            categories: row.categories,
            keywords: row.keywords,
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_published: row.is_published,
            is_deleted: row.is_deleted,
            view_count: row.view_count.max(0),
            location,
        }
    }
}

/// Presentation queries against PostgreSQL
#[derive(Clone)]
pub struct PgPresentationStore {
    pool: PgPool,
}

impl PgPresentationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn rows_to_models(rows: Vec<PresentationRow>) -> Vec<Presentation> {
        rows.into_iter().map(Presentation::from).collect()
    }
}

fn limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl PresentationStore for PgPresentationStore {
    async fn latest_published(
        &self,
        exclude_creator: Option<Uuid>,
        limit_rows: usize,
    ) -> Result<Vec<Presentation>> {
        let sql = format!(
            "SELECT {PRESENTATION_COLUMNS} FROM presentations \
             WHERE is_published AND NOT is_deleted \
               AND ($1::uuid IS NULL OR creator_id <> $1) \
             ORDER BY created_at DESC, id \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, PresentationRow>(&sql)
            .bind(exclude_creator)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch latest presentations: {}", e);
                e
            })?;
        Ok(Self::rows_to_models(rows))
    }

    async fn published_since(
        &self,
        since: DateTime<Utc>,
        exclude_creator: Option<Uuid>,
        limit_rows: usize,
    ) -> Result<Vec<Presentation>> {
        let sql = format!(
            "SELECT {PRESENTATION_COLUMNS} FROM presentations \
             WHERE is_published AND NOT is_deleted \
               AND created_at >= $1 \
               AND ($2::uuid IS NULL OR creator_id <> $2) \
             ORDER BY created_at DESC, id \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, PresentationRow>(&sql)
            .bind(since)
            .bind(exclude_creator)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch recent presentations: {}", e);
                e
            })?;
        Ok(Self::rows_to_models(rows))
    }

    async fn published_in_categories(
        &self,
        categories: &[String],
        exclude_creator: Option<Uuid>,
        limit_rows: usize,
    ) -> Result<Vec<Presentation>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {PRESENTATION_COLUMNS} FROM presentations \
             WHERE is_published AND NOT is_deleted \
               AND categories && $1 \
               AND ($2::uuid IS NULL OR creator_id <> $2) \
             ORDER BY created_at DESC, id \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, PresentationRow>(&sql)
            .bind(categories)
            .bind(exclude_creator)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch presentations by category: {}", e);
                e
            })?;
        Ok(Self::rows_to_models(rows))
    }

    async fn by_creator(&self, creator_id: Uuid, limit_rows: usize) -> Result<Vec<Presentation>> {
        let sql = format!(
            "SELECT {PRESENTATION_COLUMNS} FROM presentations \
             WHERE creator_id = $1 AND NOT is_deleted \
             ORDER BY created_at DESC, id \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, PresentationRow>(&sql)
            .bind(creator_id)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await?;
        Ok(Self::rows_to_models(rows))
    }

    async fn published_near(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        exclude_creator: Option<Uuid>,
        limit_rows: usize,
    ) -> Result<Vec<Presentation>> {
        let sql = format!(
            "SELECT * FROM ( \
                SELECT {PRESENTATION_COLUMNS}, \
                       6371.0 * 2.0 * ASIN(SQRT( \
                           POWER(SIN(RADIANS(latitude - $1) / 2.0), 2) \
                           + COS(RADIANS($1)) * COS(RADIANS(latitude)) \
                             * POWER(SIN(RADIANS(longitude - $2) / 2.0), 2) \
                       )) AS distance_km \
                FROM presentations \
                WHERE is_published AND NOT is_deleted \
                  AND latitude IS NOT NULL AND longitude IS NOT NULL \
                  AND ($4::uuid IS NULL OR creator_id <> $4) \
             ) nearby \
             WHERE distance_km <= $3 \
             ORDER BY distance_km ASC, created_at DESC \
             LIMIT $5"
        );
        let rows = sqlx::query_as::<_, PresentationRow>(&sql)
            .bind(lat)
            .bind(lng)
            .bind(radius_km)
            .bind(exclude_creator)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch nearby presentations: {}", e);
                e
            })?;
        Ok(Self::rows_to_models(rows))
    }

    async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<Presentation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {PRESENTATION_COLUMNS} FROM presentations WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, PresentationRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(Self::rows_to_models(rows))
    }

    async fn ids_matching(&self, filter: PublishFilter, limit_rows: usize) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM presentations
            WHERE ($1 OR is_published)
              AND ($2 OR NOT is_deleted)
            ORDER BY created_at ASC, id
            LIMIT $3
            "#,
        )
        .bind(filter.include_unpublished)
        .bind(filter.include_deleted)
        .bind(limit(limit_rows))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
