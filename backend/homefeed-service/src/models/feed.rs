use super::{is_valid_category_slug, Presentation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const CATEGORY_HINTS_COOKIE: &str = "pp_category_hints";
pub const KEYWORD_HINTS_COOKIE: &str = "pp_keyword_hints";
pub const RECENT_VIEWS_COOKIE: &str = "pp_recent_views";
pub const LOCATION_COOKIE: &str = "pp_location";

const MAX_CATEGORY_HINTS: usize = 8;
const MAX_KEYWORD_HINTS: usize = 16;
const MAX_RECENT_VIEW_HINTS: usize = 12;

/// Location hint resolved from the visitor's cookie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationHint {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
}

impl LocationHint {
    pub const DEFAULT_RADIUS_KM: f64 = 10.0;
    pub const MIN_RADIUS_KM: f64 = 1.0;
    pub const MAX_RADIUS_KM: f64 = 200.0;

    /// Parses `lat|lng|radius` (also `;` or `,` separated). Out-of-range
    /// coordinates reject the whole hint; a missing or unparsable radius uses the default.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw
            .split(['|', ';', ','])
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < 2 {
            return None;
        }

        let lat = parts[0].parse::<f64>().ok().filter(|v| v.is_finite())?;
        let lng = parts[1].parse::<f64>().ok().filter(|v| v.is_finite())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }

        let radius_km = parts
            .get(2)
            .and_then(|r| r.parse::<f64>().ok())
            .filter(|r| r.is_finite())
            .unwrap_or(Self::DEFAULT_RADIUS_KM)
            .clamp(Self::MIN_RADIUS_KM, Self::MAX_RADIUS_KM);

        Some(Self { lat, lng, radius_km })
    }
}

/// Per-request hints for visitors without an account. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnonymousHints {
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub recent_view_ids: Vec<Uuid>,
    pub location: Option<LocationHint>,
}

impl AnonymousHints {
    /// Builds hints from cookie values and query parameters. Query hints
    /// (`category`, `q`) come first so an explicit search outranks older cookies.
    pub fn from_request(cookies: &HashMap<String, String>, query: &HashMap<String, String>) -> Self {
        let mut category_sources = Vec::new();
        if let Some(raw) = query.get("category") {
            category_sources.push(raw.as_str());
        }
        if let Some(raw) = cookies.get(CATEGORY_HINTS_COOKIE) {
            category_sources.push(raw.as_str());
        }

        let mut keyword_sources = Vec::new();
        if let Some(raw) = query.get("q") {
            keyword_sources.push(raw.as_str());
        }
        if let Some(raw) = cookies.get(KEYWORD_HINTS_COOKIE) {
            keyword_sources.push(raw.as_str());
        }

        Self {
            categories: parse_category_hints(&category_sources),
            keywords: parse_keyword_hints(&keyword_sources),
            recent_view_ids: cookies
                .get(RECENT_VIEWS_COOKIE)
                .map(|raw| parse_recent_view_ids(raw))
                .unwrap_or_default(),
            location: cookies.get(LOCATION_COOKIE).and_then(|raw| LocationHint::parse(raw)),
        }
    }

    /// True when the visitor carries no usable signal at all
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
            && self.keywords.is_empty()
            && self.recent_view_ids.is_empty()
            && self.location.is_none()
    }
}

fn split_hint_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([',', '|', ';']).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_category_hints(sources: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .flat_map(|raw| split_hint_list(raw))
        .map(|slug| slug.to_ascii_lowercase())
        .filter(|slug| is_valid_category_slug(slug))
        .filter(|slug| seen.insert(slug.clone()))
        .take(MAX_CATEGORY_HINTS)
        .collect()
}

fn parse_keyword_hints(sources: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .flat_map(|raw| split_hint_list(raw))
        .map(str::to_string)
        .filter(|kw| seen.insert(kw.to_lowercase()))
        .take(MAX_KEYWORD_HINTS)
        .collect()
}

fn parse_recent_view_ids(raw: &str) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    split_hint_list(raw)
        .filter_map(|id| Uuid::parse_str(id).ok())
        .filter(|id| seen.insert(*id))
        .take(MAX_RECENT_VIEW_HINTS)
        .collect()
}

/// Immutable per-request feed context
#[derive(Debug, Clone)]
pub struct HomeFeedContext {
    viewer_id: Option<Uuid>,
    cards_per_block: usize,
    max_blocks: usize,
    anonymous: AnonymousHints,
    location: Option<LocationHint>,
    creator_cap: Option<usize>,
    now: DateTime<Utc>,
}

impl HomeFeedContext {
    pub const MIN_CARDS_PER_BLOCK: usize = 8;
    pub const MAX_CARDS_PER_BLOCK: usize = 12;
    pub const MIN_BLOCKS: usize = 1;
    pub const MAX_BLOCKS: usize = 12;

    pub fn new(viewer_id: Option<Uuid>, cards_per_block: usize, max_blocks: usize) -> Self {
        Self {
            viewer_id,
            cards_per_block: cards_per_block
                .clamp(Self::MIN_CARDS_PER_BLOCK, Self::MAX_CARDS_PER_BLOCK),
            max_blocks: max_blocks.clamp(Self::MIN_BLOCKS, Self::MAX_BLOCKS),
            anonymous: AnonymousHints::default(),
            location: None,
            creator_cap: None,
            now: Utc::now(),
        }
    }

    /// Anonymous hints are ignored for logged-in viewers
    pub fn with_anonymous_hints(mut self, hints: AnonymousHints) -> Self {
        if self.viewer_id.is_none() {
            self.anonymous = hints;
        }
        self
    }

    /// Location from the request cookie, honored for every viewer
    pub fn with_location(mut self, location: Option<LocationHint>) -> Self {
        self.location = location;
        self
    }

    /// At most `limit` items per creator inside one block
    pub fn with_creator_cap(mut self, limit: usize) -> Self {
        self.creator_cap = Some(limit.max(1));
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn viewer_id(&self) -> Option<Uuid> {
        self.viewer_id
    }

    pub fn is_anonymous(&self) -> bool {
        self.viewer_id.is_none()
    }

    pub fn cards_per_block(&self) -> usize {
        self.cards_per_block
    }

    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }

    pub fn anonymous_hints(&self) -> &AnonymousHints {
        &self.anonymous
    }

    /// Explicit location, else the anonymous hint's
    pub fn location(&self) -> Option<LocationHint> {
        self.location.or(self.anonymous.location)
    }

    /// No category, keyword, recent-view or location signal at all
    pub fn has_no_anonymous_signal(&self) -> bool {
        self.is_anonymous() && self.anonymous.is_empty() && self.location.is_none()
    }

    pub fn creator_cap(&self) -> Option<usize> {
        self.creator_cap
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockItemStats {
    pub likes: i64,
    pub comments: i64,
}

/// A titled, ordered group of presentations shown under one heading
#[derive(Debug, Clone, Serialize)]
pub struct HomeFeedBlock {
    pub key: String,
    pub title: String,
    pub items: Vec<Presentation>,
    pub personalized: bool,
    pub stats: HashMap<Uuid, BlockItemStats>,
}

impl HomeFeedBlock {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        items: Vec<Presentation>,
        personalized: bool,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            items,
            personalized,
            stats: HashMap::new(),
        }
    }

    pub fn with_items(self, items: Vec<Presentation>, stats: HashMap<Uuid, BlockItemStats>) -> Self {
        Self {
            items,
            stats,
            ..self
        }
    }

    pub fn item_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|p| p.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_hint_parsing() {
        let hint = LocationHint::parse("48.85|2.35|25").unwrap();
        assert_eq!(hint.radius_km, 25.0);

        let hint = LocationHint::parse("48.85;2.35").unwrap();
        assert_eq!(hint.radius_km, LocationHint::DEFAULT_RADIUS_KM);

        let hint = LocationHint::parse("48.85,2.35,5000").unwrap();
        assert_eq!(hint.radius_km, LocationHint::MAX_RADIUS_KM);

        let hint = LocationHint::parse("48.85|2.35|0").unwrap();
        assert_eq!(hint.radius_km, LocationHint::MIN_RADIUS_KM);

        assert!(LocationHint::parse("91|2.35").is_none());
        assert!(LocationHint::parse("48|181").is_none());
        assert!(LocationHint::parse("abc|def").is_none());
        assert!(LocationHint::parse("48.85").is_none());
        assert!(LocationHint::parse("NaN|2").is_none());
    }

    #[test]
    fn test_anonymous_hints_from_request() {
        let id = Uuid::new_v4();
        let mut cookies = HashMap::new();
        cookies.insert(CATEGORY_HINTS_COOKIE.to_string(), "software,Bad Slug,arts".to_string());
        cookies.insert(KEYWORD_HINTS_COOKIE.to_string(), "robots|Apps".to_string());
        cookies.insert(RECENT_VIEWS_COOKIE.to_string(), format!("{},not-a-uuid,{}", id, id));
        cookies.insert(LOCATION_COOKIE.to_string(), "garbage".to_string());

        let mut query = HashMap::new();
        query.insert("category".to_string(), "music".to_string());
        query.insert("q".to_string(), "apps".to_string());

        let hints = AnonymousHints::from_request(&cookies, &query);
        assert_eq!(hints.categories, vec!["music", "software", "arts"]);
        assert_eq!(hints.keywords, vec!["apps", "robots"]);
        assert_eq!(hints.recent_view_ids, vec![id]);
        assert!(hints.location.is_none());
        assert!(!hints.is_empty());
    }

    #[test]
    fn test_empty_request_has_no_signal() {
        let hints = AnonymousHints::from_request(&HashMap::new(), &HashMap::new());
        assert!(hints.is_empty());
    }

    #[test]
    fn test_context_clamps_bounds() {
        let ctx = HomeFeedContext::new(None, 3, 40);
        assert_eq!(ctx.cards_per_block(), 8);
        assert_eq!(ctx.max_blocks(), 12);

        let ctx = HomeFeedContext::new(None, 50, 0);
        assert_eq!(ctx.cards_per_block(), 12);
        assert_eq!(ctx.max_blocks(), 1);
    }

    #[test]
    fn test_logged_in_context_ignores_anonymous_hints() {
        let hints = AnonymousHints {
            categories: vec!["arts".to_string()],
            ..Default::default()
        };
        let ctx = HomeFeedContext::new(Some(Uuid::new_v4()), 10, 4).with_anonymous_hints(hints);
        assert!(ctx.anonymous_hints().is_empty());
    }

    #[test]
    fn test_location_applies_to_logged_in_viewers() {
        let hint = LocationHint::parse("45.76|4.83").unwrap();
        let ctx = HomeFeedContext::new(Some(Uuid::new_v4()), 12, 6).with_location(Some(hint));
        assert_eq!(ctx.location(), Some(hint));

        let anonymous = HomeFeedContext::new(None, 12, 6);
        assert!(anonymous.has_no_anonymous_signal());
        assert!(!anonymous.with_location(Some(hint)).has_no_anonymous_signal());
    }
}
