// ============================================
// Batch Jobs
// ============================================
//
// Out-of-band maintenance of derived tables:
// 1. Neighbor lists from stored embeddings (--mode neighbor-recompute)
// 2. Embeddings for published presentations (--mode embedding-index)

pub mod embedding_batch;
pub mod neighbor_batch;

pub use embedding_batch::{EmbeddingBatchJob, EmbeddingBatchStats};
pub use neighbor_batch::{NeighborBatchConfig, NeighborBatchJob, NeighborBatchStats};
