use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

mod feed;

pub use feed::{
    AnonymousHints, BlockItemStats, HomeFeedBlock, HomeFeedContext, LocationHint,
};

/// A project presentation, the unit being recommended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Category slugs
    #[serde(default)]
    pub categories: Vec<String>,
    /// Free-text keyword string as typed by the creator
    #[serde(default)]
    pub keywords: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub is_deleted: bool,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl Presentation {
    /// Age in fractional days, never negative
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.created_at).num_seconds().max(0) as f64;
        seconds / 86_400.0
    }

    pub fn is_visible(&self) -> bool {
        self.is_published && !self.is_deleted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Great-circle distance in kilometres
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Stored embedding for a presentation, one row per (presentation, model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationEmbedding {
    pub presentation_id: Uuid,
    pub model: String,
    pub dims: i32,
    pub normalized: bool,
    /// Little-endian packed f32 values
    pub vector: Vec<u8>,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Likes/comments aggregate for one presentation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub likes: i64,
    pub comments: i64,
}

/// Precomputed nearest neighbor, rank is 1-based
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRow {
    pub presentation_id: Uuid,
    pub neighbor_id: Uuid,
    pub model: String,
    pub rank: i32,
    pub score: f32,
}

/// Decayed per-user affinities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: Uuid,
    pub fav_categories: HashMap<String, f64>,
    pub fav_keywords: HashMap<String, f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserPreference {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// Category slugs ordered by score (descending), ties by slug
    pub fn top_categories(&self, limit: usize) -> Vec<String> {
        top_entries(&self.fav_categories, limit)
            .into_iter()
            .map(|(slug, _)| slug)
            .collect()
    }

    pub fn top_keywords(&self, limit: usize) -> Vec<(String, f64)> {
        top_entries(&self.fav_keywords, limit)
    }
}

pub(crate) fn top_entries(map: &HashMap<String, f64>, limit: usize) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = map
        .iter()
        .filter(|(_, score)| score.is_finite() && **score > 0.0)
        .map(|(key, score)| (key.clone(), *score))
        .collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries.truncate(limit);
    entries
}

/// Interaction kinds that feed preference learning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Follow,
    Bookmark,
    View,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Follow => "follow",
            Self::Bookmark => "bookmark",
            Self::View => "view",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "like" => Some(Self::Like),
            "follow" => Some(Self::Follow),
            "bookmark" => Some(Self::Bookmark),
            "view" => Some(Self::View),
            _ => None,
        }
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Historical interaction used by the batch preference recompute
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    pub presentation_id: Uuid,
    pub kind: InteractionKind,
    pub occurred_at: DateTime<Utc>,
}

/// Publish-state filter shared by embedding and neighbor queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishFilter {
    pub include_unpublished: bool,
    pub include_deleted: bool,
}

impl PublishFilter {
    pub fn published_only() -> Self {
        Self::default()
    }

    pub fn accepts(&self, presentation: &Presentation) -> bool {
        (self.include_unpublished || presentation.is_published)
            && (self.include_deleted || !presentation.is_deleted)
    }
}

/// Category slugs are lowercase ascii words joined by single hyphens
pub fn is_valid_category_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 64
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_category_slug_validation() {
        assert!(is_valid_category_slug("software"));
        assert!(is_valid_category_slug("arts-crafts-2"));
        assert!(!is_valid_category_slug("Software"));
        assert!(!is_valid_category_slug("-arts"));
        assert!(!is_valid_category_slug("arts--crafts"));
        assert!(!is_valid_category_slug("arts crafts"));
        assert!(!is_valid_category_slug(""));
    }

    #[test]
    fn test_top_categories_ordering() {
        let mut pref = UserPreference::empty(Uuid::new_v4());
        pref.fav_categories.insert("arts".to_string(), 2.0);
        pref.fav_categories.insert("software".to_string(), 10.0);
        pref.fav_categories.insert("music".to_string(), 2.0);
        pref.fav_categories.insert("broken".to_string(), f64::NAN);

        assert_eq!(
            pref.top_categories(8),
            vec!["software".to_string(), "arts".to_string(), "music".to_string()]
        );
        assert_eq!(pref.top_categories(1), vec!["software".to_string()]);
    }

    #[test]
    fn test_haversine_paris_lyon() {
        let paris = GeoPoint { lat: 48.8566, lng: 2.3522 };
        let lyon = GeoPoint { lat: 45.7640, lng: 4.8357 };
        let d = paris.haversine_km(&lyon);
        assert!(d > 380.0 && d < 400.0, "got {}", d);
    }

    #[test]
    fn test_age_days_never_negative() {
        let now = Utc::now();
        let presentation = Presentation {
            id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            title: "future".to_string(),
            goal: None,
            description: None,
            categories: vec![],
            keywords: None,
            created_at: now + Duration::days(2),
            updated_at: None,
            is_published: true,
            is_deleted: false,
            view_count: 0,
            location: None,
        };
        assert_eq!(presentation.age_days(now), 0.0);
    }

    #[test]
    fn test_interaction_kind_parse() {
        assert_eq!(InteractionKind::parse(" Like "), Some(InteractionKind::Like));
        assert_eq!(InteractionKind::parse("share"), None);
    }
}
