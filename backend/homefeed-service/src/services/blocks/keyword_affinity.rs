use super::shuffle::shuffle_top_window;
use super::BlockInput;
use crate::error::Result;
use crate::models::{HomeFeedBlock, Presentation};
use crate::services::keywords::KeywordNormalizer;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

pub(super) const KEY: &str = "keyword-affinity";
const TITLE: &str = "Selon vos centres d'intérêt";

const MIN_PROFILE_KEYWORDS: usize = 3;
const MIN_POOL: usize = 240;
const POOL_MULTIPLIER: usize = 30;
const KEYWORDS_PER_ITEM: usize = 12;
const MIN_MATCHED_CAP: usize = 6;
const MIN_WINDOW: usize = 24;
const WINDOW_MULTIPLIER: usize = 3;

const FRESHNESS_DECAY_DAYS: f64 = 45.0;
const FRESHNESS_WEIGHT: f64 = 0.35;
const MATCH_BONUS_STEP: f64 = 0.1;
const MATCH_BONUS_CAP: f64 = 0.5;

/// Scores candidates against a keyword profile; candidates without any
/// overlap are dropped. Sorted by score descending, newer first on ties.
pub fn score_keyword_candidates(
    candidates: Vec<Presentation>,
    profile: &HashMap<String, f64>,
    normalizer: &KeywordNormalizer,
    now: DateTime<Utc>,
) -> Vec<(Presentation, f64)> {
    let mut scored: Vec<(Presentation, f64)> = candidates
        .into_iter()
        .filter_map(|p| {
            let keywords = normalizer.keyword_set(p.keywords.as_deref(), KEYWORDS_PER_ITEM);
            let matched: Vec<f64> = keywords
                .iter()
                .filter_map(|k| profile.get(k).copied())
                .collect();
            if matched.is_empty() {
                return None;
            }

            let overlap: f64 = matched.iter().sum();
            let freshness = (-p.age_days(now) / FRESHNESS_DECAY_DAYS).exp() * FRESHNESS_WEIGHT;
            let match_bonus = (matched.len() as f64 * MATCH_BONUS_STEP).min(MATCH_BONUS_CAP);
            Some((p, overlap + freshness + match_bonus))
        })
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    scored
}

pub(super) async fn provide(
    input: &BlockInput<'_>,
    rng: &mut StdRng,
) -> Result<Option<HomeFeedBlock>> {
    let ctx = input.ctx;
    let profile = &input.signals.keyword_profile;
    if profile.len() < MIN_PROFILE_KEYWORDS {
        debug!(block = KEY, profile = profile.len(), "Keyword profile too small");
        return Ok(None);
    }

    let cards = ctx.cards_per_block();
    let candidates = input
        .stores
        .presentations
        .latest_published(ctx.viewer_id(), MIN_POOL.max(cards * POOL_MULTIPLIER))
        .await?;

    let scored = score_keyword_candidates(candidates, profile, input.normalizer, ctx.now());
    if scored.len() < cards.min(MIN_MATCHED_CAP) {
        debug!(block = KEY, matched = scored.len(), "Not enough keyword matches");
        return Ok(None);
    }

    let mut items: Vec<Presentation> = scored.into_iter().map(|(p, _)| p).collect();
    shuffle_top_window(&mut items, MIN_WINDOW.max(cards * WINDOW_MULTIPLIER), rng);

    debug!(block = KEY, matched = items.len(), "Keyword affinity block ranked");
    Ok(Some(HomeFeedBlock::new(KEY, TITLE, items, true)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::item;
    use super::*;

    fn with_keywords(age_days: i64, keywords: &str, now: DateTime<Utc>) -> Presentation {
        let mut p = item(age_days, now);
        p.keywords = Some(keywords.to_string());
        p
    }

    fn profile() -> HashMap<String, f64> {
        [("robot", 3.0), ("application", 2.0), ("energie", 1.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_items_without_overlap_are_dropped() {
        let now = Utc::now();
        let normalizer = KeywordNormalizer::default();
        let scored = score_keyword_candidates(
            vec![with_keywords(0, "cuisine, voyage", now), item(0, now)],
            &profile(),
            &normalizer,
            now,
        );
        assert!(scored.is_empty());
    }

    #[test]
    fn test_score_components() {
        let now = Utc::now();
        let normalizer = KeywordNormalizer::default();
        let scored = score_keyword_candidates(
            vec![with_keywords(0, "Robots, apps", now)],
            &profile(),
            &normalizer,
            now,
        );
        let (_, score) = &scored[0];
        // overlap 5.0 + freshness 0.35 + two matches 0.2
        assert!((score - 5.55).abs() < 1e-9);
    }

    #[test]
    fn test_match_bonus_is_capped() {
        let now = Utc::now();
        let normalizer = KeywordNormalizer::default();
        let profile: HashMap<String, f64> = ["aa", "bb", "cc", "dd", "ee", "ff", "gg"]
            .iter()
            .map(|k| (k.to_string(), 0.0))
            .collect();
        let scored = score_keyword_candidates(
            vec![with_keywords(100_000, "aa,bb,cc,dd,ee,ff,gg", now)],
            &profile,
            &normalizer,
            now,
        );
        assert!((scored[0].1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ties_prefer_newer() {
        let now = Utc::now();
        let normalizer = KeywordNormalizer::default();
        let older = with_keywords(100_000, "robot", now);
        let newer = with_keywords(90_000, "robot", now);
        let scored = score_keyword_candidates(
            vec![older, newer.clone()],
            &profile(),
            &normalizer,
            now,
        );
        assert_eq!(scored[0].0.id, newer.id);
    }
}
