use super::NeighborStore;
use crate::error::Result;
use crate::models::NeighborRow;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// `presentation_neighbors` table: derived top-K lists per (presentation, model)
#[derive(Clone)]
pub struct PgNeighborStore {
    pool: PgPool,
}

impl PgNeighborStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NeighborStore for PgNeighborStore {
    async fn top_neighbors(
        &self,
        presentation_id: Uuid,
        model: Option<String>,
        k: usize,
    ) -> Result<Vec<NeighborRow>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, i32, f32)>(
            r#"
            SELECT presentation_id, neighbor_id, model, rank, score
            FROM presentation_neighbors
            WHERE presentation_id = $1
              AND ($2::text IS NULL OR model = $2)
            ORDER BY rank ASC, score DESC
            LIMIT $3
            "#,
        )
        .bind(presentation_id)
        .bind(model)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(presentation_id, neighbor_id, model, rank, score)| NeighborRow {
                presentation_id,
                neighbor_id,
                model,
                rank,
                score,
            })
            .collect())
    }

    async fn replace_neighbors(
        &self,
        presentation_id: Uuid,
        model: &str,
        rows: &[NeighborRow],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM presentation_neighbors WHERE presentation_id = $1 AND model = $2")
            .bind(presentation_id)
            .bind(model)
            .execute(&mut *tx)
            .await?;

        if !rows.is_empty() {
            let neighbor_ids: Vec<Uuid> = rows.iter().map(|r| r.neighbor_id).collect();
            let ranks: Vec<i32> = rows.iter().map(|r| r.rank).collect();
            let scores: Vec<f32> = rows.iter().map(|r| r.score).collect();

            sqlx::query(
                r#"
                INSERT INTO presentation_neighbors (presentation_id, neighbor_id, model, rank, score)
                SELECT $1, n.neighbor_id, $2, n.rank, n.score
                FROM UNNEST($3::uuid[], $4::int4[], $5::float4[]) AS n(neighbor_id, rank, score)
                "#,
            )
            .bind(presentation_id)
            .bind(model)
            .bind(&neighbor_ids)
            .bind(&ranks)
            .bind(&scores)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            presentation_id = %presentation_id,
            model = model,
            rows = rows.len(),
            "Neighbor rows replaced"
        );
        Ok(())
    }
}
