//! In-memory store backing tests and local previews.
//!
//! Mirrors the ordering guarantees of the Postgres queries so ranking code
//! behaves the same against both.

use super::{
    EmbeddingStore, EngagementStore, InteractionStore, NeighborStore, PreferenceStore,
    PreferenceUpdateFn, PresentationStore,
};
use crate::error::Result;
use crate::models::{
    EngagementCounts, GeoPoint, InteractionEvent, InteractionKind, NeighborRow, Presentation,
    PresentationEmbedding, PublishFilter, UserPreference,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct State {
    presentations: HashMap<Uuid, Presentation>,
    likes: HashMap<Uuid, i64>,
    comments: HashMap<Uuid, i64>,
    interactions: Vec<(Uuid, InteractionEvent)>,
    preferences: HashMap<Uuid, UserPreference>,
    embeddings: HashMap<(Uuid, String), PresentationEmbedding>,
    neighbors: HashMap<(Uuid, String), Vec<NeighborRow>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    /// Serializes preference read-modify-write like the row lock in Postgres
    preference_lock: Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_presentation(&self, presentation: Presentation) {
        self.state
            .write()
            .await
            .presentations
            .insert(presentation.id, presentation);
    }

    pub async fn set_engagement(&self, presentation_id: Uuid, likes: i64, comments: i64) {
        let mut state = self.state.write().await;
        state.likes.insert(presentation_id, likes);
        state.comments.insert(presentation_id, comments);
    }

    pub async fn record_interaction(
        &self,
        user_id: Uuid,
        presentation_id: Uuid,
        kind: InteractionKind,
        occurred_at: DateTime<Utc>,
    ) {
        self.state.write().await.interactions.push((
            user_id,
            InteractionEvent {
                presentation_id,
                kind,
                occurred_at,
            },
        ));
    }

    pub async fn set_preference(&self, preference: UserPreference) {
        self.state
            .write()
            .await
            .preferences
            .insert(preference.user_id, preference);
    }

    pub async fn insert_embedding(&self, embedding: PresentationEmbedding) {
        self.state.write().await.embeddings.insert(
            (embedding.presentation_id, embedding.model.clone()),
            embedding,
        );
    }

    fn newest_first(mut items: Vec<Presentation>) -> Vec<Presentation> {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    async fn published_where<F>(
        &self,
        exclude_creator: Option<Uuid>,
        limit: usize,
        pred: F,
    ) -> Vec<Presentation>
    where
        F: Fn(&Presentation) -> bool,
    {
        let state = self.state.read().await;
        let matching: Vec<Presentation> = state
            .presentations
            .values()
            .filter(|p| p.is_visible())
            .filter(|p| Some(p.creator_id) != exclude_creator)
            .filter(|p| pred(*p))
            .cloned()
            .collect();
        let mut sorted = Self::newest_first(matching);
        sorted.truncate(limit);
        sorted
    }

    fn latest_ids_of_kind(
        state: &State,
        user_id: Uuid,
        kind: InteractionKind,
        limit: usize,
    ) -> Vec<Uuid> {
        let mut events: Vec<&InteractionEvent> = state
            .interactions
            .iter()
            .filter(|(u, e)| *u == user_id && e.kind == kind)
            .map(|(_, e)| e)
            .collect();
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let mut seen = HashSet::new();
        events
            .into_iter()
            .map(|e| e.presentation_id)
            .filter(|id| seen.insert(*id))
            .take(limit)
            .collect()
    }

    fn count_of_kind(state: &State, ids: &[Uuid], kind: InteractionKind) -> HashMap<Uuid, i64> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let mut counts = HashMap::new();
        for (_, event) in &state.interactions {
            if event.kind == kind && wanted.contains(&event.presentation_id) {
                *counts.entry(event.presentation_id).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[async_trait]
impl PresentationStore for InMemoryStore {
    async fn latest_published(
        &self,
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>> {
        Ok(self.published_where(exclude_creator, limit, |_| true).await)
    }

    async fn published_since(
        &self,
        since: DateTime<Utc>,
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>> {
        Ok(self
            .published_where(exclude_creator, limit, |p| p.created_at >= since)
            .await)
    }

    async fn published_in_categories(
        &self,
        categories: &[String],
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .published_where(exclude_creator, limit, |p| {
                p.categories.iter().any(|c| categories.contains(c))
            })
            .await)
    }

    async fn by_creator(&self, creator_id: Uuid, limit: usize) -> Result<Vec<Presentation>> {
        let state = self.state.read().await;
        let owned: Vec<Presentation> = state
            .presentations
            .values()
            .filter(|p| p.creator_id == creator_id && !p.is_deleted)
            .cloned()
            .collect();
        let mut sorted = Self::newest_first(owned);
        sorted.truncate(limit);
        Ok(sorted)
    }

    async fn published_near(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        exclude_creator: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Presentation>> {
        let origin = GeoPoint { lat, lng };
        let state = self.state.read().await;
        let mut nearby: Vec<(f64, Presentation)> = state
            .presentations
            .values()
            .filter(|p| p.is_visible())
            .filter(|p| Some(p.creator_id) != exclude_creator)
            .filter_map(|p| {
                let distance = p.location.as_ref()?.haversine_km(&origin);
                (distance <= radius_km).then(|| (distance, p.clone()))
            })
            .collect();
        nearby.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });
        Ok(nearby.into_iter().take(limit).map(|(_, p)| p).collect())
    }

    async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<Presentation>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.presentations.get(id).cloned())
            .collect())
    }

    async fn ids_matching(&self, filter: PublishFilter, limit: usize) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        let mut matching: Vec<&Presentation> = state
            .presentations
            .values()
            .filter(|p| filter.accepts(p))
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching.into_iter().take(limit).map(|p| p.id).collect())
    }
}

#[async_trait]
impl EngagementStore for InMemoryStore {
    async fn counts_for_ids(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, EngagementCounts>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                let likes = state.likes.get(id).copied();
                let comments = state.comments.get(id).copied();
                if likes.is_none() && comments.is_none() {
                    return None;
                }
                Some((
                    *id,
                    EngagementCounts {
                        likes: likes.unwrap_or(0),
                        comments: comments.unwrap_or(0),
                    },
                ))
            })
            .collect())
    }
}

#[async_trait]
impl InteractionStore for InMemoryStore {
    async fn recent_viewed_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(Self::latest_ids_of_kind(&state, user_id, InteractionKind::View, limit))
    }

    async fn latest_followed_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(Self::latest_ids_of_kind(&state, user_id, InteractionKind::Follow, limit))
    }

    async fn latest_bookmarked_ids(&self, user_id: Uuid, limit: usize) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(Self::latest_ids_of_kind(&state, user_id, InteractionKind::Bookmark, limit))
    }

    async fn follow_counts(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        let state = self.state.read().await;
        Ok(Self::count_of_kind(&state, ids, InteractionKind::Follow))
    }

    async fn bookmark_counts(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, i64>> {
        let state = self.state.read().await;
        Ok(Self::count_of_kind(&state, ids, InteractionKind::Bookmark))
    }

    async fn interaction_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<InteractionEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<InteractionEvent> = state
            .interactions
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, e)| e.clone())
            .collect();
        events.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        events.truncate(limit);
        Ok(events)
    }
}

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<UserPreference>> {
        Ok(self.state.read().await.preferences.get(&user_id).cloned())
    }

    async fn update_with(
        &self,
        user_id: Uuid,
        update: &PreferenceUpdateFn,
    ) -> Result<UserPreference> {
        let _guard = self.preference_lock.lock().await;
        let current = self.state.read().await.preferences.get(&user_id).cloned();
        let next = update(current);
        self.state
            .write()
            .await
            .preferences
            .insert(user_id, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryStore {
    async fn load_embeddings(
        &self,
        model: &str,
        dims: i32,
        filter: PublishFilter,
    ) -> Result<Vec<PresentationEmbedding>> {
        let state = self.state.read().await;
        let mut rows: Vec<PresentationEmbedding> = state
            .embeddings
            .values()
            .filter(|e| e.model == model && e.dims == dims)
            .filter(|e| {
                state
                    .presentations
                    .get(&e.presentation_id)
                    .map(|p| filter.accepts(p))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.presentation_id.cmp(&b.presentation_id));
        Ok(rows)
    }

    async fn content_hash(&self, presentation_id: Uuid, model: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .embeddings
            .get(&(presentation_id, model.to_string()))
            .map(|e| e.content_hash.clone()))
    }

    async fn upsert_embedding(&self, embedding: &PresentationEmbedding) -> Result<()> {
        self.insert_embedding(embedding.clone()).await;
        Ok(())
    }
}

#[async_trait]
impl NeighborStore for InMemoryStore {
    async fn top_neighbors(
        &self,
        presentation_id: Uuid,
        model: Option<String>,
        k: usize,
    ) -> Result<Vec<NeighborRow>> {
        let state = self.state.read().await;
        let mut rows: Vec<NeighborRow> = match model {
            Some(model) => state
                .neighbors
                .get(&(presentation_id, model))
                .cloned()
                .unwrap_or_default(),
            None => state
                .neighbors
                .iter()
                .filter(|((source, _), _)| *source == presentation_id)
                .flat_map(|(_, rows)| rows.iter().cloned())
                .collect(),
        };
        rows.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });
        rows.truncate(k);
        Ok(rows)
    }

    async fn replace_neighbors(
        &self,
        presentation_id: Uuid,
        model: &str,
        rows: &[NeighborRow],
    ) -> Result<()> {
        // Single write guard: readers see the old set or the new set.
        let mut state = self.state.write().await;
        let key = (presentation_id, model.to_string());
        state.neighbors.remove(&key);
        if !rows.is_empty() {
            state.neighbors.insert(key, rows.to_vec());
        }
        Ok(())
    }
}
