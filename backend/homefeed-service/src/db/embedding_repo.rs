use super::EmbeddingStore;
use crate::error::Result;
use crate::models::{PresentationEmbedding, PublishFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// `presentation_embeddings` table, keyed by (presentation_id, model)
#[derive(Clone)]
pub struct PgEmbeddingStore {
    pool: PgPool,
}

impl PgEmbeddingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EmbeddingRow {
    presentation_id: Uuid,
    model: String,
    dims: i32,
    normalized: bool,
    vector: Vec<u8>,
    content_hash: String,
    updated_at: DateTime<Utc>,
}

impl From<EmbeddingRow> for PresentationEmbedding {
    fn from(row: EmbeddingRow) -> Self {
        PresentationEmbedding {
            presentation_id: row.presentation_id,
            model: row.model,
            dims: row.dims,
            normalized: row.normalized,
            vector: row.vector,
            content_hash: row.content_hash,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl EmbeddingStore for PgEmbeddingStore {
    async fn load_embeddings(
        &self,
        model: &str,
        dims: i32,
        filter: PublishFilter,
    ) -> Result<Vec<PresentationEmbedding>> {
        let rows = sqlx::query_as::<_, EmbeddingRow>(
            r#"
            SELECT e.presentation_id, e.model, e.dims, e.normalized, e.vector,
                   e.content_hash, e.updated_at
            FROM presentation_embeddings e
            JOIN presentations p ON p.id = e.presentation_id
            WHERE e.model = $1 AND e.dims = $2
              AND ($3 OR p.is_published)
              AND ($4 OR NOT p.is_deleted)
            ORDER BY e.presentation_id
            "#,
        )
        .bind(model)
        .bind(dims)
        .bind(filter.include_unpublished)
        .bind(filter.include_deleted)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PresentationEmbedding::from).collect())
    }

    async fn content_hash(&self, presentation_id: Uuid, model: &str) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT content_hash FROM presentation_embeddings WHERE presentation_id = $1 AND model = $2",
        )
        .bind(presentation_id)
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    async fn upsert_embedding(&self, embedding: &PresentationEmbedding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO presentation_embeddings
                (presentation_id, model, dims, normalized, vector, content_hash, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (presentation_id, model) DO UPDATE
            SET dims = EXCLUDED.dims,
                normalized = EXCLUDED.normalized,
                vector = EXCLUDED.vector,
                content_hash = EXCLUDED.content_hash,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(embedding.presentation_id)
        .bind(&embedding.model)
        .bind(embedding.dims)
        .bind(embedding.normalized)
        .bind(&embedding.vector)
        .bind(&embedding.content_hash)
        .bind(embedding.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
