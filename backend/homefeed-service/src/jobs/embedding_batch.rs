// ============================================
// Embedding Batch Job
// ============================================
//
// Walks published presentations and refreshes embeddings whose content hash
// changed. Unchanged content never reaches the generator.
//
// Usage:
//   homefeed-service --mode embedding-index

use crate::db::FeedStores;
use crate::error::Result;
use crate::models::PublishFilter;
use crate::services::embedding::{EmbeddingIndexer, IndexOutcome};
use std::time::Instant;
use tracing::{info, warn};

/// Upper bound of presentations listed per pass
const MAX_PRESENTATIONS: usize = 100_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingBatchStats {
    pub indexed: usize,
    pub unchanged: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

pub struct EmbeddingBatchJob {
    stores: FeedStores,
    indexer: EmbeddingIndexer,
    batch_size: usize,
}

impl EmbeddingBatchJob {
    pub fn new(stores: FeedStores, indexer: EmbeddingIndexer, batch_size: usize) -> Self {
        Self {
            stores,
            indexer,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self) -> Result<EmbeddingBatchStats> {
        let start_time = Instant::now();
        let mut stats = EmbeddingBatchStats::default();

        let ids = self
            .stores
            .presentations
            .ids_matching(PublishFilter::published_only(), MAX_PRESENTATIONS)
            .await?;
        info!(presentations = ids.len(), "Starting embedding index pass");

        for chunk in ids.chunks(self.batch_size) {
            let presentations = self.stores.presentations.by_ids(chunk).await?;
            for presentation in &presentations {
                match self.indexer.index(presentation).await {
                    Ok(IndexOutcome::Indexed(_)) => stats.indexed += 1,
                    Ok(IndexOutcome::Unchanged) => stats.unchanged += 1,
                    Ok(IndexOutcome::Unavailable) => stats.unavailable += 1,
                    Err(e) => {
                        stats.failed += 1;
                        warn!(
                            presentation_id = %presentation.id,
                            error = %e,
                            "Failed to store embedding"
                        );
                    }
                }
            }
        }

        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            indexed = stats.indexed,
            unchanged = stats.unchanged,
            unavailable = stats.unavailable,
            failed = stats.failed,
            duration_ms = stats.total_duration_ms,
            "Embedding index pass completed"
        );
        Ok(stats)
    }
}
