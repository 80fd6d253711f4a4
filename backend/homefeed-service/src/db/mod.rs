//! Store contracts consumed by the feed core.
//!
//! Every query takes an explicit limit; there are no unbounded scans on the
//! request path. Postgres implementations live next to each trait family,
//! `InMemoryStore` implements all of them for tests and local runs.

mod embedding_repo;
mod engagement_repo;
mod interaction_repo;
mod memory;
mod neighbor_repo;
mod preference_repo;
mod presentation_repo;

use crate::error::Result;
use crate::models::{
    EngagementCounts, InteractionEvent, NeighborRow, Presentation, PresentationEmbedding,
    PublishFilter, UserPreference,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub use embedding_repo::PgEmbeddingStore;
pub use engagement_repo::PgEngagementStore;
pub use interaction_repo::PgInteractionStore;
pub use memory::InMemoryStore;
pub use neighbor_repo::PgNeighborStore;
pub use preference_repo::{parse_score_map, PgPreferenceStore};
pub use presentation_repo::PgPresentationStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresentationStore: Send + Sync {
    /// Latest published, non-deleted presentations, newest first
    async fn latest_published(
        &self,
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>>;

    /// Latest published presentations created at or after `since`
    async fn published_since(
        &self,
        since: DateTime<Utc>,
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>>;

    /// Latest published presentations sharing at least one category
    async fn published_in_categories(
        &self,
        categories: &[String],
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>>;

    /// Creator's own non-deleted presentations, newest first
    async fn by_creator(&self, creator_id: Uuid, limit: usize) -> Result<Vec<Presentation>>;

    /// Published presentations within `radius_km` of a point, nearest first
    async fn published_near(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>>;

    /// Lookup by id; missing ids are skipped, order is unspecified
    async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<Presentation>>;

    /// Ids matching a publish-state filter, oldest first
    async fn ids_matching(&self, filter: PublishFilter, limit: usize) -> Result<Vec<Uuid>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Likes/comments per id in one round trip. Ids without activity may be absent.
    async fn counts_for_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, EngagementCounts>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Distinct presentation ids the user viewed, most recent first
    async fn recent_viewed_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>>;

    async fn latest_followed_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>>;

    async fn latest_bookmarked_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>>;

    async fn follow_counts(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, i64>>;

    async fn bookmark_counts(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, i64>>;

    /// Likes, follows, bookmarks and views of a user, most recent first
    async fn interaction_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<InteractionEvent>>;
}

/// Read-modify-write callback applied under the per-user lock
pub type PreferenceUpdateFn = dyn Fn(Option<UserPreference>) -> UserPreference + Send + Sync;

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<Option<UserPreference>>;

    /// Runs `update` against the current row and persists its output.
    /// Implementations serialize concurrent updates for the same user.
    async fn update_with(
        &self,
        user_id: Uuid,
        update: &PreferenceUpdateFn,
    ) -> Result<UserPreference>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn load_embeddings(
        &self,
        model: &str,
        dims: i32,
        filter: PublishFilter,
    ) -> Result<Vec<PresentationEmbedding>>;

    async fn content_hash(&self, presentation_id: Uuid, model: &str) -> Result<Option<String>>;

    async fn upsert_embedding(&self, embedding: &PresentationEmbedding) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NeighborStore: Send + Sync {
    /// Top-k neighbors by rank. `model = None` reads rows of any model.
    async fn top_neighbors(
        &self,
        presentation_id: Uuid,
        model: Option<String>,
        k: usize,
    ) -> Result<Vec<NeighborRow>>;

    /// Atomically replaces every row of (presentation, model)
    async fn replace_neighbors(
        &self,
        presentation_id: Uuid,
        model: &str,
        rows: &[NeighborRow],
    ) -> Result<()>;
}

/// All collaborators the feed core reads from
#[derive(Clone)]
pub struct FeedStores {
    pub presentations: Arc<dyn PresentationStore>,
    pub engagement: Arc<dyn EngagementStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub embeddings: Arc<dyn EmbeddingStore>,
    pub neighbors: Arc<dyn NeighborStore>,
}

impl FeedStores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            presentations: Arc::new(PgPresentationStore::new(pool.clone())),
            engagement: Arc::new(PgEngagementStore::new(pool.clone())),
            interactions: Arc::new(PgInteractionStore::new(pool.clone())),
            preferences: Arc::new(PgPreferenceStore::new(pool.clone())),
            embeddings: Arc::new(PgEmbeddingStore::new(pool.clone())),
            neighbors: Arc::new(PgNeighborStore::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            presentations: store.clone(),
            engagement: store.clone(),
            interactions: store.clone(),
            preferences: store.clone(),
            embeddings: store.clone(),
            neighbors: store,
        }
    }
}
