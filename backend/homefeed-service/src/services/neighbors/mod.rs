// ============================================
// Presentation Neighbor Recompute
// ============================================
//
// Offline top-K nearest neighbors over stored embeddings.
//
// 1. Load every embedding of (model, dims) passing the publish filter
// 2. Unpack, re-normalize vectors not flagged as normalized
// 3. For each target: cosine (dot of unit vectors) against all others, top K
// 4. Replace the target's neighbor rows for the model in one transaction
//
// O(N²) per pass; runs in batch only.

pub mod vector;

use crate::db::FeedStores;
use crate::error::Result;
use crate::models::{NeighborRow, PublishFilter};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use vector::{dot, l2_normalize, pack_f32_le, unpack_f32_le};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeOutcome {
    pub updated: usize,
    pub skipped_missing_vector: usize,
    /// Vectors the targets were compared against
    pub candidates: usize,
}

impl RecomputeOutcome {
    pub fn merge(&mut self, other: RecomputeOutcome) {
        self.updated += other.updated;
        self.skipped_missing_vector += other.skipped_missing_vector;
        self.candidates = self.candidates.max(other.candidates);
    }
}

/// Unit vectors of one (model, dims) pair, loaded once per pass
#[derive(Debug, Clone)]
pub struct NeighborIndex {
    model: String,
    ids: Vec<Uuid>,
    vectors: Vec<Vec<f32>>,
    positions: HashMap<Uuid, usize>,
}

impl NeighborIndex {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Top `k` by cosine, score descending then id; the target itself is excluded
    pub fn nearest(&self, target: Uuid, k: usize) -> Option<Vec<(Uuid, f32)>> {
        let &position = self.positions.get(&target)?;
        let query = &self.vectors[position];

        let mut scored: Vec<(Uuid, f32)> = self
            .ids
            .iter()
            .zip(&self.vectors)
            .filter(|(id, _)| **id != target)
            .map(|(id, v)| (*id, dot(query, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Some(scored)
    }
}

pub struct PresentationNeighborRecomputeService {
    stores: FeedStores,
}

impl PresentationNeighborRecomputeService {
    pub fn new(stores: FeedStores) -> Self {
        Self { stores }
    }

    /// Ids carrying an embedding for (model, dims) and passing the filter
    pub async fn list_presentation_ids(
        &self,
        model: &str,
        dims: i32,
        filter: PublishFilter,
    ) -> Result<Vec<Uuid>> {
        let embeddings = self.stores.embeddings.load_embeddings(model, dims, filter).await?;
        Ok(embeddings.into_iter().map(|e| e.presentation_id).collect())
    }

    pub async fn load_index(
        &self,
        model: &str,
        dims: i32,
        filter: PublishFilter,
    ) -> Result<NeighborIndex> {
        let embeddings = self.stores.embeddings.load_embeddings(model, dims, filter).await?;
        let total = embeddings.len();
        let dims = usize::try_from(dims).unwrap_or(0);

        let mut index = NeighborIndex {
            model: model.to_string(),
            ids: Vec::with_capacity(total),
            vectors: Vec::with_capacity(total),
            positions: HashMap::with_capacity(total),
        };

        for embedding in embeddings {
            let Some(mut vector) = unpack_f32_le(&embedding.vector, dims) else {
                debug!(presentation_id = %embedding.presentation_id, "Undecodable embedding skipped");
                continue;
            };
            if !embedding.normalized && !l2_normalize(&mut vector) {
                continue;
            }
            index.positions.insert(embedding.presentation_id, index.ids.len());
            index.ids.push(embedding.presentation_id);
            index.vectors.push(vector);
        }

        debug!(model = model, loaded = index.len(), total = total, "Neighbor index loaded");
        Ok(index)
    }

    pub async fn recompute_for_presentation_ids(
        &self,
        ids: &[Uuid],
        model: &str,
        dims: i32,
        k: usize,
        filter: PublishFilter,
    ) -> Result<RecomputeOutcome> {
        let index = self.load_index(model, dims, filter).await?;
        self.recompute_with_index(&index, ids, k).await
    }

    /// Recomputes `ids` against a preloaded index
    pub async fn recompute_with_index(
        &self,
        index: &NeighborIndex,
        ids: &[Uuid],
        k: usize,
    ) -> Result<RecomputeOutcome> {
        let mut outcome = RecomputeOutcome {
            candidates: index.len(),
            ..Default::default()
        };

        if index.is_empty() {
            warn!(
                model = index.model(),
                requested = ids.len(),
                "No embeddings available, neighbor recompute skipped"
            );
            outcome.skipped_missing_vector = ids.len();
            return Ok(outcome);
        }

        for id in ids {
            let Some(nearest) = index.nearest(*id, k) else {
                outcome.skipped_missing_vector += 1;
                continue;
            };

            let rows: Vec<NeighborRow> = nearest
                .into_iter()
                .enumerate()
                .map(|(i, (neighbor_id, score))| NeighborRow {
                    presentation_id: *id,
                    neighbor_id,
                    model: index.model().to_string(),
                    rank: i as i32 + 1,
                    score,
                })
                .collect();

            self.stores
                .neighbors
                .replace_neighbors(*id, index.model(), &rows)
                .await?;
            outcome.updated += 1;
        }

        info!(
            model = index.model(),
            updated = outcome.updated,
            skipped = outcome.skipped_missing_vector,
            candidates = outcome.candidates,
            "Neighbor recompute finished"
        );
        Ok(outcome)
    }
}
