use super::BlockInput;
use crate::error::Result;
use crate::models::{EngagementCounts, HomeFeedBlock, Presentation};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

pub(super) const KEY: &str = "trending";
const TITLE: &str = "Tendances";

const MIN_POOL: usize = 180;
const POOL_MULTIPLIER: usize = 15;

const LIKE_WEIGHT: f64 = 1.0;
const COMMENT_WEIGHT: f64 = 1.8;
const VIEW_WEIGHT: f64 = 1.2;
const FRESHNESS_BOOST: f64 = 5.0;
const FRESHNESS_DECAY_DAYS: f64 = 14.0;

/// likes×1.0 + comments×1.8 + ln(1+views)×1.2 + e^(−age/14)×5
pub fn trending_score(
    presentation: &Presentation,
    counts: EngagementCounts,
    now: DateTime<Utc>,
) -> f64 {
    let views = presentation.view_count.max(0) as f64;
    let freshness = (-presentation.age_days(now) / FRESHNESS_DECAY_DAYS).exp() * FRESHNESS_BOOST;

    counts.likes.max(0) as f64 * LIKE_WEIGHT
        + counts.comments.max(0) as f64 * COMMENT_WEIGHT
        + views.ln_1p() * VIEW_WEIGHT
        + freshness
}

/// Stable sort by score descending, newer first on ties
pub fn rank_trending(
    items: Vec<Presentation>,
    counts: &HashMap<Uuid, EngagementCounts>,
    now: DateTime<Utc>,
) -> Vec<Presentation> {
    let mut scored: Vec<(f64, Presentation)> = items
        .into_iter()
        .map(|p| {
            let c = counts.get(&p.id).copied().unwrap_or_default();
            (trending_score(&p, c, now), p)
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    scored.into_iter().map(|(_, p)| p).collect()
}

pub(super) async fn provide(input: &BlockInput<'_>) -> Result<Option<HomeFeedBlock>> {
    let ctx = input.ctx;
    let now = ctx.now();
    let pool = MIN_POOL.max(ctx.cards_per_block() * POOL_MULTIPLIER);
    let since = now - Duration::days(input.settings.trending_window_days.max(1));

    let items = input
        .stores
        .presentations
        .published_since(since, ctx.viewer_id(), pool)
        .await?;
    if items.is_empty() {
        return Ok(None);
    }

    let ids: Vec<Uuid> = items.iter().map(|p| p.id).collect();
    let counts = input.stores.engagement.counts_for_ids(&ids).await?;
    let ranked = rank_trending(items, &counts, now);

    debug!(block = KEY, candidates = ranked.len(), "Trending block ranked");
    Ok(Some(HomeFeedBlock::new(KEY, TITLE, ranked, false)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::item;
    use super::*;

    #[test]
    fn test_score_formula() {
        let now = Utc::now();
        let mut p = item(0, now);
        p.view_count = 0;
        let score = trending_score(&p, EngagementCounts { likes: 2, comments: 1 }, now);
        assert!((score - (2.0 + 1.8 + 5.0)).abs() < 1e-9);
    }

    #[test]
    fn test_freshness_boost_decays() {
        let now = Utc::now();
        let p = item(14, now);
        let score = trending_score(&p, EngagementCounts::default(), now);
        assert!((score - 5.0 * (-1.0_f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_engagement_outranks_freshness() {
        let now = Utc::now();
        let fresh = item(0, now);
        let popular = item(30, now);
        let mut counts = HashMap::new();
        counts.insert(popular.id, EngagementCounts { likes: 10, comments: 2 });

        let ranked = rank_trending(vec![fresh.clone(), popular.clone()], &counts, now);
        assert_eq!(ranked[0].id, popular.id);
        assert_eq!(ranked[1].id, fresh.id);
    }

    #[test]
    fn test_equal_scores_prefer_newer() {
        let now = Utc::now();
        // Far enough in the past that the freshness boost underflows to the same value
        let older = item(20_000, now);
        let newer = item(19_000, now);
        let ranked = rank_trending(vec![older.clone(), newer.clone()], &HashMap::new(), now);
        assert_eq!(trending_score(&older, EngagementCounts::default(), now), 0.0);
        assert_eq!(ranked[0].id, newer.id);
    }
}
