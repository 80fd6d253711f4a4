//! Single-list recommendations ("pour vous", related projects).
//!
//! score = personalized
//!     ? w.content × content + w.engagement × engagement + w.freshness × freshness
//!     : w.engagement × engagement + w.freshness × freshness
//!
//! Selection walks the ranked list under a per-category cap and fills any
//! remaining slots from deferred items in score order.

mod weights;

pub use weights::{
    parse_weight_overrides, EngagementWeights, GenericWeights, PersonalizedWeights,
    SimilarityWeights,
};

use crate::config::RecommendationConfig;
use crate::db::FeedStores;
use crate::error::{AppError, Result};
use crate::models::{BlockItemStats, EngagementCounts, Presentation};
use crate::services::keywords::KeywordNormalizer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_LIMIT: usize = 24;

/// Own and followed presentations read to build a viewer's seed profile
const SEED_ITEMS: usize = 20;
const KEYWORDS_PER_ITEM: usize = 12;

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResult {
    pub items: Vec<Presentation>,
    pub stats: HashMap<Uuid, BlockItemStats>,
    pub is_personalized: bool,
}

/// Categories and canonical keywords the candidates are compared against
#[derive(Debug, Clone, Default)]
pub struct SeedProfile {
    pub categories: HashSet<String>,
    pub keywords: HashSet<String>,
}

impl SeedProfile {
    pub fn from_presentations<'a>(
        items: impl IntoIterator<Item = &'a Presentation>,
        normalizer: &KeywordNormalizer,
    ) -> Self {
        let mut profile = Self::default();
        for item in items {
            profile.categories.extend(category_set(item));
            profile
                .keywords
                .extend(normalizer.keyword_set(item.keywords.as_deref(), KEYWORDS_PER_ITEM));
        }
        profile
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.keywords.is_empty()
    }
}

/// Engagement aggregates for the candidate pool
#[derive(Debug, Clone, Default)]
pub struct EngagementSignals {
    pub counts: HashMap<Uuid, EngagementCounts>,
    pub follows: HashMap<Uuid, i64>,
    pub bookmarks: HashMap<Uuid, i64>,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub presentation: Presentation,
    pub score: f64,
    pub content: f64,
    pub engagement: f64,
    pub freshness: f64,
}

fn category_set(item: &Presentation) -> HashSet<String> {
    item.categories
        .iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}

fn overlap_ratio(seed: &HashSet<String>, candidate: &HashSet<String>) -> f64 {
    if seed.is_empty() {
        return 0.0;
    }
    seed.intersection(candidate).count() as f64 / seed.len() as f64
}

/// Scores and sorts a pool. Ties go to the newer item, then the smaller id.
pub fn rank_candidates(
    pool: Vec<Presentation>,
    seed: &SeedProfile,
    engagement: &EngagementSignals,
    config: &RecommendationConfig,
    normalizer: &KeywordNormalizer,
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let personalized = !seed.is_empty();
    let ew = &config.engagement;

    let raw: Vec<f64> = pool
        .iter()
        .map(|p| {
            let c = engagement.counts.get(&p.id).copied().unwrap_or_default();
            ew.raw_score(
                c.likes,
                c.comments,
                engagement.follows.get(&p.id).copied().unwrap_or(0),
                engagement.bookmarks.get(&p.id).copied().unwrap_or(0),
                p.view_count,
            )
        })
        .collect();
    let max_raw = raw.iter().copied().fold(0.0_f64, f64::max);

    let mut scored: Vec<ScoredCandidate> = pool
        .into_iter()
        .zip(raw)
        .map(|(p, raw)| {
            let content = if personalized {
                let cs = overlap_ratio(&seed.categories, &category_set(&p));
                let ks = overlap_ratio(
                    &seed.keywords,
                    &normalizer.keyword_set(p.keywords.as_deref(), KEYWORDS_PER_ITEM),
                );
                config.similarity.category * cs + config.similarity.keyword * ks
            } else {
                0.0
            };
            let engagement = if max_raw > 0.0 { raw / max_raw } else { 0.0 };
            let freshness = (-p.age_days(now) / config.freshness_decay_days).exp();

            let score = if personalized {
                let w = &config.personalized;
                w.content * content + w.engagement * engagement + w.freshness * freshness
            } else {
                let w = &config.generic;
                w.engagement * engagement + w.freshness * freshness
            };

            ScoredCandidate {
                presentation: p,
                score,
                content,
                engagement,
                freshness,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.presentation.created_at.cmp(&a.presentation.created_at))
            .then_with(|| a.presentation.id.cmp(&b.presentation.id))
    });
    scored
}

/// Accepts an item only while each of its categories is under `max_per_category`.
/// Deferred items fill the remaining slots afterwards, in score order.
pub fn select_with_diversity_cap(
    ranked: Vec<ScoredCandidate>,
    limit: usize,
    max_per_category: usize,
) -> Vec<ScoredCandidate> {
    let cap = max_per_category.max(1);
    let mut per_category: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(limit);
    let mut deferred = Vec::new();

    for candidate in ranked {
        if selected.len() >= limit {
            break;
        }
        let categories = category_set(&candidate.presentation);
        let under_cap = categories
            .iter()
            .all(|c| per_category.get(c).copied().unwrap_or(0) < cap);

        if under_cap {
            for c in categories {
                *per_category.entry(c).or_insert(0) += 1;
            }
            selected.push(candidate);
        } else {
            deferred.push(candidate);
        }
    }

    let missing = limit.saturating_sub(selected.len());
    selected.extend(deferred.into_iter().take(missing));
    selected
}

pub struct RecommendationEngine {
    stores: FeedStores,
    normalizer: Arc<KeywordNormalizer>,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(
        stores: FeedStores,
        normalizer: Arc<KeywordNormalizer>,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            stores,
            normalizer,
            config,
        }
    }

    /// "Recommended for you": one ranked list, personalized when the viewer
    /// has own or followed presentations.
    pub async fn recommend_homepage(
        &self,
        viewer_id: Option<Uuid>,
        limit: usize,
        exclude_ids: &[Uuid],
    ) -> Result<RecommendationResult> {
        let seed = match viewer_id {
            Some(viewer_id) => self.viewer_seed(viewer_id).await?,
            None => SeedProfile::default(),
        };

        let excluded: HashSet<Uuid> = exclude_ids.iter().copied().collect();
        let pool = self.candidate_pool(viewer_id, &excluded).await?;
        self.rank_and_select(pool, &seed, limit, Utc::now()).await
    }

    /// Projects related to one presentation; the source seeds the profile
    pub async fn recommend_related(
        &self,
        presentation_id: Uuid,
        limit: usize,
    ) -> Result<RecommendationResult> {
        let source = self
            .stores
            .presentations
            .by_ids(&[presentation_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("presentation {}", presentation_id)))?;

        let seed = SeedProfile::from_presentations([&source], &self.normalizer);
        let excluded: HashSet<Uuid> = [presentation_id].into_iter().collect();
        let pool = self.candidate_pool(None, &excluded).await?;
        self.rank_and_select(pool, &seed, limit, Utc::now()).await
    }

    async fn viewer_seed(&self, viewer_id: Uuid) -> Result<SeedProfile> {
        let own = self
            .stores
            .presentations
            .by_creator(viewer_id, SEED_ITEMS)
            .await?;
        let followed_ids = self
            .stores
            .interactions
            .latest_followed_ids(viewer_id, SEED_ITEMS)
            .await?;
        let followed = self.stores.presentations.by_ids(&followed_ids).await?;

        Ok(SeedProfile::from_presentations(
            own.iter().chain(followed.iter()),
            &self.normalizer,
        ))
    }

    async fn candidate_pool(
        &self,
        viewer_id: Option<Uuid>,
        excluded: &HashSet<Uuid>,
    ) -> Result<Vec<Presentation>> {
        let pool = self
            .stores
            .presentations
            .latest_published(viewer_id, self.config.candidate_limit)
            .await?;
        Ok(pool.into_iter().filter(|p| !excluded.contains(&p.id)).collect())
    }

    async fn rank_and_select(
        &self,
        pool: Vec<Presentation>,
        seed: &SeedProfile,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<RecommendationResult> {
        let limit = limit.min(MAX_LIMIT);
        let is_personalized = !seed.is_empty();
        if pool.is_empty() || limit == 0 {
            return Ok(RecommendationResult {
                items: Vec::new(),
                stats: HashMap::new(),
                is_personalized,
            });
        }

        let ids: Vec<Uuid> = pool.iter().map(|p| p.id).collect();
        let engagement = EngagementSignals {
            counts: self.stores.engagement.counts_for_ids(&ids).await?,
            follows: self.stores.interactions.follow_counts(&ids).await?,
            bookmarks: self.stores.interactions.bookmark_counts(&ids).await?,
        };

        let pool_size = pool.len();
        let ranked = rank_candidates(pool, seed, &engagement, &self.config, &self.normalizer, now);
        let selected = select_with_diversity_cap(ranked, limit, self.config.max_per_category);

        let stats = selected
            .iter()
            .map(|c| {
                let counts = engagement
                    .counts
                    .get(&c.presentation.id)
                    .copied()
                    .unwrap_or_default();
                (
                    c.presentation.id,
                    BlockItemStats {
                        likes: counts.likes,
                        comments: counts.comments,
                    },
                )
            })
            .collect();

        if let Some(top) = selected.first() {
            debug!(
                top_score = top.score,
                content = top.content,
                engagement = top.engagement,
                freshness = top.freshness,
                "Top recommendation"
            );
        }
        info!(
            pool = pool_size,
            selected = selected.len(),
            personalized = is_personalized,
            "Recommendations ranked"
        );

        Ok(RecommendationResult {
            items: selected.into_iter().map(|c| c.presentation).collect(),
            stats,
            is_personalized,
        })
    }
}
