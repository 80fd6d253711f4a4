//! Viewer signal resolution.
//!
//! Resolves, once per request, everything the block providers personalize on:
//! category affinities, a keyword score profile and neighbor seed ids.

use crate::config::PreferenceConfig;
use crate::db::FeedStores;
use crate::error::Result;
use crate::models::{is_valid_category_slug, HomeFeedContext, UserPreference};
use crate::services::keywords::KeywordNormalizer;
use crate::services::preferences::PreferenceLearner;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const MAX_PREFERENCE_CATEGORIES: usize = 8;
pub const MAX_PROFILE_KEYWORDS: usize = 60;
pub const MAX_ANONYMOUS_KEYWORDS: usize = 16;
pub const MAX_SEEDS_LOGGED_IN: usize = 5;
pub const MAX_SEEDS_ANONYMOUS: usize = 6;

/// Own presentations inspected for the category fallback
const OWN_RECENT_LIMIT: usize = 12;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorySignals {
    pub primary: Vec<String>,
    pub primary_from_preferences: bool,
    pub fallback: Vec<String>,
}

impl CategorySignals {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.fallback.is_empty()
    }
}

/// Everything resolved for one viewer in one request
#[derive(Debug, Clone, Default)]
pub struct ViewerSignals {
    pub categories: CategorySignals,
    pub keyword_profile: HashMap<String, f64>,
    pub neighbor_seeds: Vec<Uuid>,
}

#[derive(Clone)]
pub struct ViewerSignalProvider {
    stores: FeedStores,
    normalizer: Arc<KeywordNormalizer>,
    learner: PreferenceLearner,
}

impl ViewerSignalProvider {
    pub fn new(stores: FeedStores, normalizer: Arc<KeywordNormalizer>) -> Self {
        Self {
            learner: PreferenceLearner::new(PreferenceConfig::default(), normalizer.clone()),
            stores,
            normalizer,
        }
    }

    /// Half-life and retention limits applied when reading stored preferences
    pub fn with_preference_config(mut self, config: PreferenceConfig) -> Self {
        self.learner = PreferenceLearner::new(config, self.normalizer.clone());
        self
    }

    pub async fn resolve(&self, ctx: &HomeFeedContext) -> Result<ViewerSignals> {
        let preference = self.load_preference(ctx).await?;
        let signals = ViewerSignals {
            categories: self.category_signals(ctx, preference.as_ref()).await?,
            keyword_profile: self.keyword_profile(ctx, preference.as_ref()),
            neighbor_seeds: self.neighbor_seed_ids(ctx).await?,
        };

        debug!(
            viewer = ?ctx.viewer_id(),
            categories = signals.categories.primary.len(),
            keywords = signals.keyword_profile.len(),
            seeds = signals.neighbor_seeds.len(),
            "Viewer signals resolved"
        );
        Ok(signals)
    }

    /// The viewer's stored preference decayed to the request time
    pub async fn load_preference(&self, ctx: &HomeFeedContext) -> Result<Option<UserPreference>> {
        let Some(viewer_id) = ctx.viewer_id() else {
            return Ok(None);
        };
        let stored = self.stores.preferences.load(viewer_id).await?;
        Ok(stored.map(|pref| self.learner.effective(&pref, ctx.now())))
    }

    pub async fn category_signals(
        &self,
        ctx: &HomeFeedContext,
        preference: Option<&UserPreference>,
    ) -> Result<CategorySignals> {
        let Some(viewer_id) = ctx.viewer_id() else {
            return Ok(CategorySignals {
                primary: ctx.anonymous_hints().categories.clone(),
                primary_from_preferences: false,
                fallback: Vec::new(),
            });
        };

        let from_preferences = preference
            .map(|pref| pref.top_categories(MAX_PREFERENCE_CATEGORIES))
            .unwrap_or_default();

        let own = self
            .stores
            .presentations
            .by_creator(viewer_id, OWN_RECENT_LIMIT)
            .await?;
        let mut seen = HashSet::new();
        let own_categories: Vec<String> = own
            .iter()
            .flat_map(|p| p.categories.iter())
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| is_valid_category_slug(c))
            .filter(|c| seen.insert(c.clone()))
            .take(MAX_PREFERENCE_CATEGORIES)
            .collect();

        if from_preferences.is_empty() {
            Ok(CategorySignals {
                primary: own_categories,
                primary_from_preferences: false,
                fallback: Vec::new(),
            })
        } else {
            Ok(CategorySignals {
                primary: from_preferences,
                primary_from_preferences: true,
                fallback: own_categories,
            })
        }
    }

    /// Canonical keyword → score. Logged-in viewers read stored affinities,
    /// anonymous visitors get hint-rank weights `max(1, n - index)`.
    pub fn keyword_profile(
        &self,
        ctx: &HomeFeedContext,
        preference: Option<&UserPreference>,
    ) -> HashMap<String, f64> {
        if ctx.viewer_id().is_some() {
            let mut profile = HashMap::new();
            let Some(pref) = preference else {
                return profile;
            };
            for (raw, score) in pref.top_keywords(MAX_PROFILE_KEYWORDS) {
                if let Some(keyword) = self.normalizer.normalize_keyword(&raw) {
                    *profile.entry(keyword).or_insert(0.0) += score;
                }
            }
            return profile;
        }

        let hints: Vec<&String> = ctx
            .anonymous_hints()
            .keywords
            .iter()
            .take(MAX_ANONYMOUS_KEYWORDS)
            .collect();
        anonymous_keyword_weights(&self.normalizer, &hints)
    }

    /// Recently viewed, then followed, then bookmarked; first seen wins
    pub async fn neighbor_seed_ids(&self, ctx: &HomeFeedContext) -> Result<Vec<Uuid>> {
        let Some(viewer_id) = ctx.viewer_id() else {
            return Ok(ctx
                .anonymous_hints()
                .recent_view_ids
                .iter()
                .take(MAX_SEEDS_ANONYMOUS)
                .copied()
                .collect());
        };

        let mut seeds = Vec::with_capacity(MAX_SEEDS_LOGGED_IN);
        let interactions = &self.stores.interactions;

        let viewed = interactions
            .recent_viewed_ids(viewer_id, MAX_SEEDS_LOGGED_IN)
            .await?;
        push_unique(&mut seeds, viewed, MAX_SEEDS_LOGGED_IN);

        if seeds.len() < MAX_SEEDS_LOGGED_IN {
            let followed = interactions
                .latest_followed_ids(viewer_id, MAX_SEEDS_LOGGED_IN)
                .await?;
            push_unique(&mut seeds, followed, MAX_SEEDS_LOGGED_IN);
        }

        if seeds.len() < MAX_SEEDS_LOGGED_IN {
            let bookmarked = interactions
                .latest_bookmarked_ids(viewer_id, MAX_SEEDS_LOGGED_IN)
                .await?;
            push_unique(&mut seeds, bookmarked, MAX_SEEDS_LOGGED_IN);
        }

        Ok(seeds)
    }
}

fn push_unique(seeds: &mut Vec<Uuid>, ids: Vec<Uuid>, cap: usize) {
    for id in ids {
        if seeds.len() >= cap {
            break;
        }
        if !seeds.contains(&id) {
            seeds.push(id);
        }
    }
}

fn anonymous_keyword_weights(
    normalizer: &KeywordNormalizer,
    hints: &[&String],
) -> HashMap<String, f64> {
    let n = hints.len();
    let mut profile: HashMap<String, f64> = HashMap::new();
    for (index, raw) in hints.iter().enumerate() {
        let Some(keyword) = normalizer.normalize_keyword(raw) else {
            continue;
        };
        let weight = (n - index).max(1) as f64;
        let entry = profile.entry(keyword).or_insert(0.0);
        *entry = entry.max(weight);
    }
    profile
}
