use super::EngagementStore;
use crate::error::Result;
use crate::models::EngagementCounts;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// Likes/comments aggregates, one round trip per id list
#[derive(Clone)]
pub struct PgEngagementStore {
    pool: PgPool,
}

impl PgEngagementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EngagementStore for PgEngagementStore {
    async fn counts_for_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, EngagementCounts>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (Uuid, i64, i64)>(
            r#"
            SELECT p.id,
                   COALESCE(l.cnt, 0) AS likes,
                   COALESCE(c.cnt, 0) AS comments
            FROM UNNEST($1::uuid[]) AS p(id)
            LEFT JOIN (
                SELECT presentation_id, COUNT(*) AS cnt
                FROM presentation_likes
                WHERE presentation_id = ANY($1)
                GROUP BY presentation_id
            ) l ON l.presentation_id = p.id
            LEFT JOIN (
                SELECT presentation_id, COUNT(*) AS cnt
                FROM presentation_comments
                WHERE presentation_id = ANY($1) AND NOT is_deleted
                GROUP BY presentation_id
            ) c ON c.presentation_id = p.id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, likes, comments)| (id, EngagementCounts { likes, comments }))
            .collect())
    }
}
