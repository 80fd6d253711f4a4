//! Configurable weight groups for the recommendation score.
//!
//! Overrides arrive as `key=value` lists. Entries that are not finite positive
//! numbers keep their default; a group whose sum is not positive reverts to
//! its defaults wholesale. Blend groups are renormalized to sum to 1.

use serde::Deserialize;
use std::collections::HashMap;

/// Parses `category=0.5, keyword=0.5` into raw key/value pairs
pub fn parse_weight_overrides(raw: &str) -> HashMap<String, String> {
    raw.split([',', ';'])
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').or_else(|| pair.split_once(':'))?;
            let key = key.trim().to_ascii_lowercase();
            (!key.is_empty()).then(|| (key, value.trim().to_string()))
        })
        .collect()
}

fn resolve<const N: usize>(
    keys: [&str; N],
    defaults: [f64; N],
    overrides: &HashMap<String, String>,
    renormalize: bool,
) -> [f64; N] {
    let mut weights = defaults;
    for (slot, key) in weights.iter_mut().zip(keys) {
        if let Some(value) = overrides
            .get(key)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
        {
            *slot = value;
        }
    }

    let sum: f64 = weights.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        weights = defaults;
    }

    if renormalize {
        let sum: f64 = weights.iter().sum();
        if sum > 0.0 {
            for w in weights.iter_mut() {
                *w /= sum;
            }
        }
    }
    weights
}

/// Content similarity blend
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SimilarityWeights {
    pub category: f64,
    pub keyword: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            category: 0.75,
            keyword: 0.25,
        }
    }
}

impl SimilarityWeights {
    pub fn from_overrides(overrides: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let [category, keyword] =
            resolve(["category", "keyword"], [d.category, d.keyword], overrides, true);
        Self { category, keyword }
    }
}

/// Raw engagement coefficients; the engagement score is divided by the pool
/// maximum afterwards so these are not renormalized.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EngagementWeights {
    pub likes: f64,
    pub comments: f64,
    pub follows: f64,
    pub bookmarks: f64,
    pub views: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            likes: 1.0,
            comments: 1.4,
            follows: 1.8,
            bookmarks: 1.1,
            views: 0.6,
        }
    }
}

impl EngagementWeights {
    pub fn from_overrides(overrides: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let [likes, comments, follows, bookmarks, views] = resolve(
            ["likes", "comments", "follows", "bookmarks", "views"],
            [d.likes, d.comments, d.follows, d.bookmarks, d.views],
            overrides,
            false,
        );
        Self {
            likes,
            comments,
            follows,
            bookmarks,
            views,
        }
    }

    pub fn raw_score(&self, likes: i64, comments: i64, follows: i64, bookmarks: i64, views: i64) -> f64 {
        self.likes * likes.max(0) as f64
            + self.comments * comments.max(0) as f64
            + self.follows * follows.max(0) as f64
            + self.bookmarks * bookmarks.max(0) as f64
            + self.views * (views.max(0) as f64).ln_1p()
    }
}

/// Final blend when the viewer has a seed profile
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PersonalizedWeights {
    pub content: f64,
    pub engagement: f64,
    pub freshness: f64,
}

impl Default for PersonalizedWeights {
    fn default() -> Self {
        Self {
            content: 0.60,
            engagement: 0.25,
            freshness: 0.15,
        }
    }
}

impl PersonalizedWeights {
    pub fn from_overrides(overrides: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let [content, engagement, freshness] = resolve(
            ["content", "engagement", "freshness"],
            [d.content, d.engagement, d.freshness],
            overrides,
            true,
        );
        Self {
            content,
            engagement,
            freshness,
        }
    }
}

/// Final blend without a seed profile
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GenericWeights {
    pub engagement: f64,
    pub freshness: f64,
}

impl Default for GenericWeights {
    fn default() -> Self {
        Self {
            engagement: 0.65,
            freshness: 0.35,
        }
    }
}

impl GenericWeights {
    pub fn from_overrides(overrides: &HashMap<String, String>) -> Self {
        let d = Self::default();
        let [engagement, freshness] = resolve(
            ["engagement", "freshness"],
            [d.engagement, d.freshness],
            overrides,
            true,
        );
        Self {
            engagement,
            freshness,
        }
    }
}
