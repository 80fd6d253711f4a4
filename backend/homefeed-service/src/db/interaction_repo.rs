use super::InteractionStore;
use crate::error::Result;
use crate::models::{InteractionEvent, InteractionKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Follows, bookmarks and view events
#[derive(Clone)]
pub struct PgInteractionStore {
    pool: PgPool,
}

impl PgInteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn counts_in(&self, table: &str, ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT presentation_id, COUNT(*) FROM {table} \
             WHERE presentation_id = ANY($1) \
             GROUP BY presentation_id"
        );
        let rows = sqlx::query_as::<_, (Uuid, i64)>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn latest_in(&self, table: &str, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let sql = format!(
            "SELECT presentation_id FROM {table} \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        let ids = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl InteractionStore for PgInteractionStore {
    async fn recent_viewed_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT presentation_id
            FROM presentation_views
            WHERE user_id = $1
            GROUP BY presentation_id
            ORDER BY MAX(viewed_at) DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        debug!(user_id = %user_id, count = ids.len(), "Loaded recent views");
        Ok(ids)
    }

    async fn latest_followed_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        self.latest_in("presentation_follows", user_id, limit).await
    }

    async fn latest_bookmarked_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        self.latest_in("presentation_bookmarks", user_id, limit).await
    }

    async fn follow_counts(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        self.counts_in("presentation_follows", ids).await
    }

    async fn bookmark_counts(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        self.counts_in("presentation_bookmarks", ids).await
    }

    async fn interaction_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<InteractionEvent>> {
        let rows = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>)>(
            r#"
            SELECT presentation_id, kind, occurred_at FROM (
                SELECT presentation_id, 'like' AS kind, created_at AS occurred_at
                FROM presentation_likes WHERE user_id = $1
                UNION ALL
                SELECT presentation_id, 'follow', created_at
                FROM presentation_follows WHERE user_id = $1
                UNION ALL
                SELECT presentation_id, 'bookmark', created_at
                FROM presentation_bookmarks WHERE user_id = $1
                UNION ALL
                SELECT presentation_id, 'view', viewed_at
                FROM presentation_views WHERE user_id = $1
            ) history
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(presentation_id, kind, occurred_at)| {
                InteractionKind::parse(&kind).map(|kind| InteractionEvent {
                    presentation_id,
                    kind,
                    occurred_at,
                })
            })
            .collect())
    }
}
