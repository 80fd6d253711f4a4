// ============================================
// Neighbor Batch Job
// ============================================
//
// Recomputes the top-K neighbor lists of every embedded presentation.
// The embedding index is loaded once, targets are processed in chunks.
//
// Usage:
//   homefeed-service --mode neighbor-recompute

use crate::config::Config;
use crate::error::Result;
use crate::models::PublishFilter;
use crate::services::neighbors::{PresentationNeighborRecomputeService, RecomputeOutcome};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone)]
pub struct NeighborBatchConfig {
    pub model: String,
    pub dims: i32,
    pub k: usize,
    /// Presentations recomputed per chunk
    pub batch_size: usize,
    pub filter: PublishFilter,
}

impl NeighborBatchConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.embedding.model.clone(),
            dims: config.embedding.dims,
            k: config.neighbors.k.max(1),
            batch_size: config.neighbors.batch_size.max(1),
            filter: PublishFilter {
                include_unpublished: config.neighbors.include_unpublished,
                include_deleted: config.neighbors.include_deleted,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NeighborBatchStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub batches: usize,
    pub outcome: RecomputeOutcome,
    pub total_duration_ms: u64,
}

pub struct NeighborBatchJob {
    config: NeighborBatchConfig,
    service: PresentationNeighborRecomputeService,
}

impl NeighborBatchJob {
    pub fn new(config: NeighborBatchConfig, service: PresentationNeighborRecomputeService) -> Self {
        Self { config, service }
    }

    pub async fn run(&self) -> Result<NeighborBatchStats> {
        let start_time = Instant::now();
        let mut stats = NeighborBatchStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        info!(
            model = %self.config.model,
            dims = self.config.dims,
            k = self.config.k,
            batch_size = self.config.batch_size,
            "Starting neighbor recompute"
        );

        let index = self
            .service
            .load_index(&self.config.model, self.config.dims, self.config.filter)
            .await?;
        let ids = index.ids().to_vec();
        stats.outcome.candidates = index.len();

        if ids.is_empty() {
            // Logs the empty-set warning and reports zero updates
            stats.outcome = self.service.recompute_with_index(&index, &[], self.config.k).await?;
        }

        for (batch_idx, batch) in ids.chunks(self.config.batch_size).enumerate() {
            info!(batch = batch_idx + 1, presentations = batch.len(), "Processing neighbor batch");
            let outcome = self
                .service
                .recompute_with_index(&index, batch, self.config.k)
                .await?;
            stats.outcome.merge(outcome);
            stats.batches += 1;
        }

        stats.completed_at = Some(Utc::now());
        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            batches = stats.batches,
            updated = stats.outcome.updated,
            skipped = stats.outcome.skipped_missing_vector,
            candidates = stats.outcome.candidates,
            duration_ms = stats.total_duration_ms,
            "Neighbor recompute completed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FeedStores, InMemoryStore};
    use crate::models::{Presentation, PresentationEmbedding};
    use crate::services::neighbors::pack_f32_le;
    use std::sync::Arc;
    use uuid::Uuid;

    fn job_config(batch_size: usize) -> NeighborBatchConfig {
        NeighborBatchConfig {
            model: "m".to_string(),
            dims: 2,
            k: 3,
            batch_size,
            filter: PublishFilter::published_only(),
        }
    }

    #[tokio::test]
    async fn test_runs_in_chunks() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..5 {
            let id = Uuid::new_v4();
            store
                .insert_presentation(Presentation {
                    id,
                    creator_id: Uuid::new_v4(),
                    title: format!("Projet {}", i),
                    goal: None,
                    description: None,
                    categories: Vec::new(),
                    keywords: None,
                    created_at: Utc::now(),
                    updated_at: None,
                    is_published: true,
                    is_deleted: false,
                    view_count: 0,
                    location: None,
                })
                .await;
            store
                .insert_embedding(PresentationEmbedding {
                    presentation_id: id,
                    model: "m".to_string(),
                    dims: 2,
                    normalized: false,
                    vector: pack_f32_le(&[1.0, i as f32]),
                    content_hash: String::new(),
                    updated_at: Utc::now(),
                })
                .await;
        }

        let service = PresentationNeighborRecomputeService::new(FeedStores::in_memory(store));
        let stats = NeighborBatchJob::new(job_config(2), service).run().await.unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.outcome.updated, 5);
        assert_eq!(stats.outcome.candidates, 5);
        assert!(stats.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_index() {
        let service =
            PresentationNeighborRecomputeService::new(FeedStores::in_memory(Arc::new(InMemoryStore::new())));
        let stats = NeighborBatchJob::new(job_config(10), service).run().await.unwrap();
        assert_eq!(stats.batches, 0);
        assert_eq!(stats.outcome.updated, 0);
    }
}
