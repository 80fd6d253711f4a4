// ============================================
// Preference Learning
// ============================================
//
// Maintains the decayed category/keyword affinities stored per user.
//
// score(t) = score(t0) * 0.5 ^ (days(t - t0) / half_life)
//
// Interaction weights:
// - Follow: 4.0
// - Bookmark: 3.5
// - Like: 3.0
// - View: 1.0
//
// Keywords receive `weight * keyword_factor`. Scores are clamped to
// `max_score`, pruned below `min_retained` and truncated to the top N.

use crate::config::PreferenceConfig;
use crate::db::FeedStores;
use crate::error::Result;
use crate::models::{
    is_valid_category_slug, top_entries, InteractionEvent, InteractionKind, Presentation,
    UserPreference,
};
use crate::services::keywords::KeywordNormalizer;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events read when rebuilding a user from history
const HISTORY_LIMIT: usize = 2_000;

pub fn interaction_weight(kind: InteractionKind) -> f64 {
    match kind {
        InteractionKind::Like => 3.0,
        InteractionKind::Follow => 4.0,
        InteractionKind::Bookmark => 3.5,
        InteractionKind::View => 1.0,
    }
}

/// Pure preference arithmetic: snapshots in, new values out
#[derive(Debug, Clone)]
pub struct PreferenceLearner {
    config: PreferenceConfig,
    normalizer: Arc<KeywordNormalizer>,
}

impl PreferenceLearner {
    pub fn new(config: PreferenceConfig, normalizer: Arc<KeywordNormalizer>) -> Self {
        Self { config, normalizer }
    }

    fn decay_factor(&self, elapsed_days: f64) -> f64 {
        if self.config.half_life_days <= 0.0 || elapsed_days <= 0.0 {
            return 1.0;
        }
        0.5_f64.powf(elapsed_days / self.config.half_life_days)
    }

    fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        (to - from).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Scores decayed from `updated_at` to `now`
    pub fn decay(&self, snapshot: &UserPreference, now: DateTime<Utc>) -> UserPreference {
        let factor = snapshot
            .updated_at
            .map(|at| self.decay_factor(Self::elapsed_days(at, now)))
            .unwrap_or(1.0);

        let scale = |map: &HashMap<String, f64>| -> HashMap<String, f64> {
            map.iter().map(|(k, v)| (k.clone(), v * factor)).collect()
        };

        UserPreference {
            user_id: snapshot.user_id,
            fav_categories: scale(&snapshot.fav_categories),
            fav_keywords: scale(&snapshot.fav_keywords),
            updated_at: Some(now),
        }
    }

    /// Stored scores as they stand at `now`: decayed, clamped and pruned below `min_retained`
    pub fn effective(&self, snapshot: &UserPreference, now: DateTime<Utc>) -> UserPreference {
        let decayed = self.decay(snapshot, now);
        self.finalize(decayed, now)
    }

    /// Decay the snapshot, credit the presentation's categories and keywords, then bound the maps
    pub fn apply_interaction(
        &self,
        user_id: Uuid,
        snapshot: Option<&UserPreference>,
        presentation: &Presentation,
        kind: InteractionKind,
        now: DateTime<Utc>,
    ) -> UserPreference {
        let mut next = match snapshot {
            Some(current) => self.decay(current, now),
            None => UserPreference::empty(user_id),
        };
        next.user_id = user_id;

        self.credit(&mut next, presentation, interaction_weight(kind));
        self.finalize(next, now)
    }

    /// Rebuilds a preference from raw history, each event decayed by its own age
    pub fn recompute_from_history(
        &self,
        user_id: Uuid,
        events: &[InteractionEvent],
        presentations: &HashMap<Uuid, Presentation>,
        now: DateTime<Utc>,
    ) -> UserPreference {
        let mut next = UserPreference::empty(user_id);

        for event in events {
            let Some(presentation) = presentations.get(&event.presentation_id) else {
                continue;
            };
            let weight = interaction_weight(event.kind)
                * self.decay_factor(Self::elapsed_days(event.occurred_at, now));
            self.credit(&mut next, presentation, weight);
        }

        self.finalize(next, now)
    }

    fn credit(&self, preference: &mut UserPreference, presentation: &Presentation, weight: f64) {
        for slug in presentation.categories.iter().map(|c| c.trim().to_ascii_lowercase()) {
            if is_valid_category_slug(&slug) {
                *preference.fav_categories.entry(slug).or_insert(0.0) += weight;
            }
        }

        let keyword_weight = weight * self.config.keyword_factor;
        if let Some(raw) = presentation.keywords.as_deref() {
            for keyword in self
                .normalizer
                .normalize_raw_keywords(raw, self.config.keywords_per_item)
            {
                *preference.fav_keywords.entry(keyword).or_insert(0.0) += keyword_weight;
            }
        }
    }

    fn finalize(&self, mut preference: UserPreference, now: DateTime<Utc>) -> UserPreference {
        preference.fav_categories =
            self.bound(&preference.fav_categories, self.config.max_categories);
        preference.fav_keywords = self.bound(&preference.fav_keywords, self.config.max_keywords);
        preference.updated_at = Some(now);
        preference
    }

    fn bound(&self, map: &HashMap<String, f64>, limit: usize) -> HashMap<String, f64> {
        let clamped: HashMap<String, f64> = map
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.clone(), v.min(self.config.max_score)))
            .filter(|(_, v)| *v >= self.config.min_retained)
            .collect();
        top_entries(&clamped, limit).into_iter().collect()
    }
}

/// Store-backed preference maintenance
#[derive(Clone)]
pub struct PreferenceService {
    stores: FeedStores,
    learner: PreferenceLearner,
}

impl PreferenceService {
    pub fn new(stores: FeedStores, learner: PreferenceLearner) -> Self {
        Self { stores, learner }
    }

    /// Applies one interaction under the store's per-user lock.
    /// Returns `None` when the presentation does not exist.
    pub async fn record_interaction(
        &self,
        user_id: Uuid,
        presentation_id: Uuid,
        kind: InteractionKind,
        now: DateTime<Utc>,
    ) -> Result<Option<UserPreference>> {
        let Some(presentation) = self
            .stores
            .presentations
            .by_ids(&[presentation_id])
            .await?
            .into_iter()
            .next()
        else {
            debug!(presentation_id = %presentation_id, "Interaction on unknown presentation ignored");
            return Ok(None);
        };

        let learner = self.learner.clone();
        let updated = self
            .stores
            .preferences
            .update_with(user_id, &move |current: Option<UserPreference>| {
                learner.apply_interaction(user_id, current.as_ref(), &presentation, kind, now)
            })
            .await?;

        debug!(
            user_id = %user_id,
            kind = %kind,
            categories = updated.fav_categories.len(),
            "Preference updated from interaction"
        );
        Ok(Some(updated))
    }

    /// Recomputes a user's preference from interaction history and stores it
    pub async fn recompute_user(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UserPreference> {
        let events = self
            .stores
            .interactions
            .interaction_history(user_id, HISTORY_LIMIT)
            .await?;

        let mut ids: Vec<Uuid> = events.iter().map(|e| e.presentation_id).collect();
        ids.sort();
        ids.dedup();
        let presentations: HashMap<Uuid, Presentation> = self
            .stores
            .presentations
            .by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let rebuilt = self
            .learner
            .recompute_from_history(user_id, &events, &presentations, now);
        let stored = self
            .stores
            .preferences
            .update_with(user_id, &move |_current: Option<UserPreference>| rebuilt.clone())
            .await?;

        info!(
            user_id = %user_id,
            events = events.len(),
            categories = stored.fav_categories.len(),
            keywords = stored.fav_keywords.len(),
            "Preference recomputed from history"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use chrono::Duration;

    fn learner() -> PreferenceLearner {
        PreferenceLearner::new(PreferenceConfig::default(), Arc::new(KeywordNormalizer::default()))
    }

    fn presentation(categories: &[&str], keywords: Option<&str>) -> Presentation {
        Presentation {
            id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            title: "Atelier".to_string(),
            goal: None,
            description: None,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            keywords: keywords.map(str::to_string),
            created_at: Utc::now(),
            updated_at: None,
            is_published: true,
            is_deleted: false,
            view_count: 0,
            location: None,
        }
    }

    #[test]
    fn test_half_life_decay() {
        let now = Utc::now();
        let mut pref = UserPreference::empty(Uuid::new_v4());
        pref.fav_categories.insert("software".to_string(), 8.0);
        pref.updated_at = Some(now - Duration::days(30));

        let decayed = learner().decay(&pref, now);
        let score = decayed.fav_categories["software"];
        assert!((score - 4.0).abs() < 1e-6);
        assert_eq!(decayed.updated_at, Some(now));
    }

    #[test]
    fn test_effective_prunes_stale_scores() {
        let now = Utc::now();
        let mut pref = UserPreference::empty(Uuid::new_v4());
        pref.fav_categories.insert("software".to_string(), 10.0);
        pref.fav_keywords.insert("robot".to_string(), 10.0);
        pref.updated_at = Some(now - Duration::days(365));

        // 10 * 0.5^(365/30) ~ 0.0022, under min_retained
        let stale = learner().effective(&pref, now);
        assert!(stale.fav_categories.is_empty());
        assert!(stale.fav_keywords.is_empty());

        pref.updated_at = Some(now - Duration::days(30));
        let recent = learner().effective(&pref, now);
        assert!((recent.fav_categories["software"] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_apply_interaction_credits_categories_and_keywords() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let item = presentation(&["software", "Not A Slug"], Some("Apps, robots"));

        let pref = learner().apply_interaction(user, None, &item, InteractionKind::Follow, now);
        assert_eq!(pref.fav_categories.len(), 1);
        assert_eq!(pref.fav_categories["software"], 4.0);
        assert_eq!(pref.fav_keywords["application"], 2.0);
        assert_eq!(pref.fav_keywords["robot"], 2.0);
    }

    #[test]
    fn test_scores_are_clamped_and_pruned() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let mut pref = UserPreference::empty(user);
        pref.fav_categories.insert("arts".to_string(), 99.5);
        pref.fav_categories.insert("music".to_string(), 0.01);
        pref.updated_at = Some(now);

        let item = presentation(&["arts"], None);
        let next = learner().apply_interaction(user, Some(&pref), &item, InteractionKind::Like, now);
        assert_eq!(next.fav_categories["arts"], 100.0);
        assert!(!next.fav_categories.contains_key("music"));
    }

    #[test]
    fn test_top_n_truncation() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let mut pref = UserPreference::empty(user);
        for i in 0..40 {
            pref.fav_categories.insert(format!("cat-{}", i), 1.0 + i as f64);
        }
        pref.updated_at = Some(now);

        let item = presentation(&["cat-0"], None);
        let next = learner().apply_interaction(user, Some(&pref), &item, InteractionKind::View, now);
        assert_eq!(next.fav_categories.len(), 24);
        assert!(next.fav_categories.contains_key("cat-39"));
        assert!(!next.fav_categories.contains_key("cat-1"));
    }

    #[test]
    fn test_recompute_from_history_decays_old_events() {
        let now = Utc::now();
        let user = Uuid::new_v4();
        let fresh = presentation(&["software"], None);
        let old = presentation(&["arts"], None);
        let events = vec![
            InteractionEvent {
                presentation_id: fresh.id,
                kind: InteractionKind::Like,
                occurred_at: now,
            },
            InteractionEvent {
                presentation_id: old.id,
                kind: InteractionKind::Like,
                occurred_at: now - Duration::days(60),
            },
            InteractionEvent {
                presentation_id: Uuid::new_v4(),
                kind: InteractionKind::Follow,
                occurred_at: now,
            },
        ];
        let presentations: HashMap<Uuid, Presentation> =
            [(fresh.id, fresh.clone()), (old.id, old.clone())].into_iter().collect();

        let pref = learner().recompute_from_history(user, &events, &presentations, now);
        assert!((pref.fav_categories["software"] - 3.0).abs() < 1e-6);
        assert!((pref.fav_categories["arts"] - 0.75).abs() < 1e-6);
        assert_eq!(pref.fav_categories.len(), 2);
    }

    #[tokio::test]
    async fn test_service_records_interaction() {
        let store = Arc::new(InMemoryStore::new());
        let item = presentation(&["software"], Some("robotique"));
        store.insert_presentation(item.clone()).await;

        let service = PreferenceService::new(FeedStores::in_memory(store.clone()), learner());
        let user = Uuid::new_v4();
        let now = Utc::now();

        let first = service
            .record_interaction(user, item.id, InteractionKind::Bookmark, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.fav_categories["software"], 3.5);

        let second = service
            .record_interaction(user, item.id, InteractionKind::Like, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.fav_categories["software"], 6.5);

        let missing = service
            .record_interaction(user, Uuid::new_v4(), InteractionKind::Like, now)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_service_recompute_user() {
        let store = Arc::new(InMemoryStore::new());
        let item = presentation(&["music"], None);
        store.insert_presentation(item.clone()).await;

        let user = Uuid::new_v4();
        let now = Utc::now();
        store
            .record_interaction(user, item.id, InteractionKind::View, now)
            .await;
        store
            .record_interaction(user, item.id, InteractionKind::Like, now)
            .await;

        let service = PreferenceService::new(FeedStores::in_memory(store.clone()), learner());
        let pref = service.recompute_user(user, now).await.unwrap();
        assert_eq!(pref.fav_categories["music"], 4.0);

        let stored = FeedStores::in_memory(store).preferences.load(user).await.unwrap();
        assert_eq!(stored.unwrap().fav_categories["music"], 4.0);
    }
}
