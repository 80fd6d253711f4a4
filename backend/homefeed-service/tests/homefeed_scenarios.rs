//! Integration Tests: Home feed assembly against the in-memory store
//!
//! Coverage:
//! - Anonymous first visit gets a single explore block
//! - Category preferences drive the first block for logged-in viewers
//! - Neighbor lists computed from embeddings feed the neighbor block
//! - No presentation appears twice across or inside blocks
//! - Seeded assembly is reproducible, shuffles never change membership
//! - Neighbor table rows are ranked, bounded and never self-referencing
//! - Interactions update preferences that the next feed picks up
//! - Stale preferences decay out of the affinity blocks
//! - The nearby block keeps in-radius items, nearest first

use chrono::{Duration, Utc};
use homefeed_service::config::{FeedConfig, PreferenceConfig, RecommendationConfig};
use homefeed_service::models::{
    AnonymousHints, GeoPoint, HomeFeedBlock, InteractionKind, LocationHint, Presentation,
    PresentationEmbedding, PublishFilter, UserPreference,
};
use homefeed_service::services::blocks::rank_trending;
use homefeed_service::services::keywords::KeywordConfig;
use homefeed_service::services::neighbors::pack_f32_le;
use homefeed_service::services::{PreferenceLearner, PreferenceService};
use homefeed_service::{
    AppError, BlockProvider, FeedStores, HomeFeedAssembler, InMemoryStore, KeywordNormalizer,
    PresentationNeighborRecomputeService, RecommendationEngine,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

const MODEL: &str = "text-embedding-3-small";

fn presentation(category: &str, age_hours: i64) -> Presentation {
    Presentation {
        id: Uuid::new_v4(),
        creator_id: Uuid::new_v4(),
        title: format!("Projet {}", category),
        goal: None,
        description: None,
        categories: vec![category.to_string()],
        keywords: None,
        created_at: Utc::now() - Duration::hours(age_hours),
        updated_at: None,
        is_published: true,
        is_deleted: false,
        view_count: 0,
        location: None,
    }
}

fn located(lat: f64, lng: f64) -> Presentation {
    let mut p = presentation("urbanism", 1);
    p.location = Some(GeoPoint { lat, lng });
    p
}

fn embedding(presentation_id: Uuid, values: &[f32]) -> PresentationEmbedding {
    PresentationEmbedding {
        presentation_id,
        model: MODEL.to_string(),
        dims: values.len() as i32,
        normalized: false,
        vector: pack_f32_le(values),
        content_hash: String::new(),
        updated_at: Utc::now(),
    }
}

async fn seeded_store(items: &[Presentation]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for item in items {
        store.insert_presentation(item.clone()).await;
    }
    store
}

fn assembler(store: Arc<InMemoryStore>) -> HomeFeedAssembler {
    let normalizer = Arc::new(KeywordNormalizer::new(&KeywordConfig::default()));
    HomeFeedAssembler::new(FeedStores::in_memory(store), normalizer, FeedConfig::default())
}

fn ids_of(block: &HomeFeedBlock) -> HashSet<Uuid> {
    block.items.iter().map(|p| p.id).collect()
}

fn assert_no_duplicates(blocks: &[HomeFeedBlock]) {
    let mut seen = HashSet::new();
    for block in blocks {
        for item in &block.items {
            assert!(
                seen.insert(item.id),
                "presentation {} appears twice (block {})",
                item.id,
                block.key
            );
        }
    }
}

#[tokio::test]
async fn test_anonymous_first_visit_gets_explore_block() {
    let items: Vec<Presentation> = (0..10).map(|i| presentation("software", i)).collect();
    let assembler = assembler(seeded_store(&items).await);

    let ctx = assembler.default_context(None);
    let mut rng = StdRng::seed_from_u64(7);
    let blocks = assembler.build_with_rng(&ctx, &mut rng).await.unwrap();

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].key, "anon-explore-fallback");
    assert_eq!(blocks[0].title, "Explorer sur Propon");
    assert!(!blocks[0].personalized);
    assert_eq!(blocks[0].items.len(), 10);
    assert_eq!(blocks[0].stats.len(), 10);
}

#[tokio::test]
async fn test_category_preference_leads_the_feed() {
    let software: Vec<Presentation> = (0..5).map(|i| presentation("software", i)).collect();
    let arts: Vec<Presentation> = (0..5).map(|i| presentation("arts", i + 5)).collect();
    let all: Vec<Presentation> = software.iter().chain(arts.iter()).cloned().collect();
    let store = seeded_store(&all).await;

    let viewer = Uuid::new_v4();
    store
        .set_preference(UserPreference {
            user_id: viewer,
            fav_categories: HashMap::from([("software".to_string(), 10.0)]),
            fav_keywords: HashMap::new(),
            updated_at: Some(Utc::now()),
        })
        .await;

    let assembler = assembler(store);
    let ctx = assembler.default_context(Some(viewer));
    let mut rng = StdRng::seed_from_u64(11);
    let blocks = assembler.build_with_rng(&ctx, &mut rng).await.unwrap();

    assert!(!blocks.is_empty());
    assert_eq!(blocks[0].key, "category-affinity");
    assert!(blocks[0].personalized);
    let expected: HashSet<Uuid> = software.iter().map(|p| p.id).collect();
    assert_eq!(ids_of(&blocks[0]), expected);

    // Remaining items surface in later, non-personalized blocks
    assert!(blocks.len() >= 2);
    let arts_ids: HashSet<Uuid> = arts.iter().map(|p| p.id).collect();
    assert_eq!(ids_of(&blocks[1]), arts_ids);
    assert_no_duplicates(&blocks);
}

#[tokio::test]
async fn test_recent_view_seeds_neighbor_block() {
    let items: Vec<Presentation> = (0..10).map(|i| presentation("software", i)).collect();
    let store = seeded_store(&items).await;
    for (i, item) in items.iter().enumerate() {
        store
            .insert_embedding(embedding(item.id, &[1.0, i as f32 * 0.1, 0.0]))
            .await;
    }

    let stores = FeedStores::in_memory(store.clone());
    let recompute = PresentationNeighborRecomputeService::new(stores);
    let ids: Vec<Uuid> = items.iter().map(|p| p.id).collect();
    let outcome = recompute
        .recompute_for_presentation_ids(&ids, MODEL, 3, 20, PublishFilter::published_only())
        .await
        .unwrap();
    assert_eq!(outcome.updated, 10);

    let viewer = Uuid::new_v4();
    let seed = items[0].id;
    store
        .record_interaction(viewer, seed, InteractionKind::View, Utc::now())
        .await;

    let assembler = assembler(store);
    let ctx = assembler.default_context(Some(viewer));
    let mut rng = StdRng::seed_from_u64(3);
    let blocks = assembler.build_with_rng(&ctx, &mut rng).await.unwrap();

    assert_eq!(blocks[0].key, "neighbor-affinity");
    assert_eq!(blocks[0].title, "Projets similaires");
    assert_eq!(blocks[0].items.len(), 9);
    assert!(!ids_of(&blocks[0]).contains(&seed));
    assert_no_duplicates(&blocks);
}

#[tokio::test]
async fn test_mixed_signals_never_duplicate() {
    let categories = ["software", "arts", "music", "food"];
    let items: Vec<Presentation> = (0..60)
        .map(|i| {
            let mut p = presentation(categories[i % categories.len()], i as i64);
            p.keywords = Some("robotique, drone, open source".to_string());
            p
        })
        .collect();
    let store = seeded_store(&items).await;
    for item in items.iter().take(20) {
        store.set_engagement(item.id, 3, 1).await;
    }

    let assembler = assembler(store);
    let hints = AnonymousHints {
        categories: vec!["arts".to_string()],
        keywords: vec!["drone".to_string(), "robotique".to_string()],
        ..Default::default()
    };
    let ctx = assembler.default_context(None).with_anonymous_hints(hints);

    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let blocks = assembler.build_with_rng(&ctx, &mut rng).await.unwrap();
        assert!(!blocks.is_empty());
        assert!(blocks.len() <= ctx.max_blocks());
        for block in &blocks {
            assert!(!block.items.is_empty());
            assert!(block.items.len() <= ctx.cards_per_block());
            assert!(block.stats.keys().all(|id| ids_of(block).contains(id)));
        }
        assert_no_duplicates(&blocks);
    }
}

#[tokio::test]
async fn test_seeded_assembly_is_reproducible() {
    let items: Vec<Presentation> = (0..10).map(|i| presentation("software", i)).collect();
    let assembler = assembler(seeded_store(&items).await);
    let ctx = assembler.default_context(None);

    let first = assembler
        .build_with_rng(&ctx, &mut StdRng::seed_from_u64(42))
        .await
        .unwrap();
    let second = assembler
        .build_with_rng(&ctx, &mut StdRng::seed_from_u64(42))
        .await
        .unwrap();
    let other = assembler
        .build_with_rng(&ctx, &mut StdRng::seed_from_u64(43))
        .await
        .unwrap();

    assert_eq!(first[0].item_ids(), second[0].item_ids());
    // The pool fits in the shuffle window, so only the order may change
    assert_eq!(ids_of(&first[0]), ids_of(&other[0]));
}

#[tokio::test]
async fn test_neighbor_rows_are_ranked_and_bounded() {
    let items: Vec<Presentation> = (0..6).map(|i| presentation("software", i)).collect();
    let store = seeded_store(&items).await;
    for (i, item) in items.iter().enumerate() {
        store
            .insert_embedding(embedding(item.id, &[1.0, i as f32, 0.5]))
            .await;
    }
    let stores = FeedStores::in_memory(store);
    let recompute = PresentationNeighborRecomputeService::new(stores.clone());
    let target = items[2].id;

    for k in [4usize, 10] {
        recompute
            .recompute_for_presentation_ids(&[target], MODEL, 3, k, PublishFilter::published_only())
            .await
            .unwrap();

        let rows = stores
            .neighbors
            .top_neighbors(target, Some(MODEL.to_string()), 50)
            .await
            .unwrap();
        assert_eq!(rows.len(), k.min(items.len() - 1));

        let ranks: Vec<i32> = rows.iter().map(|r| r.rank).collect();
        let expected: Vec<i32> = (1..=rows.len() as i32).collect();
        assert_eq!(ranks, expected);
        assert!(rows.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(rows.iter().all(|r| r.neighbor_id != target));

        let distinct: HashSet<Uuid> = rows.iter().map(|r| r.neighbor_id).collect();
        assert_eq!(distinct.len(), rows.len());
    }
}

#[tokio::test]
async fn test_recompute_without_embeddings_reports_skips() {
    let items: Vec<Presentation> = (0..3).map(|i| presentation("software", i)).collect();
    let stores = FeedStores::in_memory(seeded_store(&items).await);
    let recompute = PresentationNeighborRecomputeService::new(stores);

    let ids: Vec<Uuid> = items.iter().map(|p| p.id).collect();
    let outcome = recompute
        .recompute_for_presentation_ids(&ids, MODEL, 3, 5, PublishFilter::published_only())
        .await
        .unwrap();
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.skipped_missing_vector, 3);
}

#[test]
fn test_trending_ties_prefer_newer() {
    let now = Utc::now();
    let mut older = presentation("software", 0);
    let mut newer = presentation("software", 0);
    older.created_at = now;
    newer.created_at = now + Duration::seconds(1);

    // Both are clamped to age zero, so their scores are identical
    let ranked = rank_trending(vec![older.clone(), newer.clone()], &HashMap::new(), now);
    assert_eq!(ranked[0].id, newer.id);
    assert_eq!(ranked[1].id, older.id);
}

#[tokio::test]
async fn test_liked_category_shapes_next_feed() {
    let software: Vec<Presentation> = (0..4).map(|i| presentation("software", i)).collect();
    let arts: Vec<Presentation> = (0..4).map(|i| presentation("arts", i)).collect();
    let all: Vec<Presentation> = software.iter().chain(arts.iter()).cloned().collect();
    let store = seeded_store(&all).await;
    let stores = FeedStores::in_memory(store.clone());
    let normalizer = Arc::new(KeywordNormalizer::new(&KeywordConfig::default()));

    let viewer = Uuid::new_v4();
    let preferences = PreferenceService::new(
        stores.clone(),
        PreferenceLearner::new(PreferenceConfig::default(), normalizer.clone()),
    );
    let updated = preferences
        .record_interaction(viewer, arts[0].id, InteractionKind::Like, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(updated.fav_categories.get("arts").copied().unwrap_or(0.0) > 0.0);

    let unknown = preferences
        .record_interaction(viewer, Uuid::new_v4(), InteractionKind::Like, Utc::now())
        .await
        .unwrap();
    assert!(unknown.is_none());

    let assembler = HomeFeedAssembler::new(stores, normalizer, FeedConfig::default());
    let ctx = assembler.default_context(Some(viewer));
    let blocks = assembler
        .build_with_rng(&ctx, &mut StdRng::seed_from_u64(5))
        .await
        .unwrap();
    assert_eq!(blocks[0].key, "category-affinity");
    assert!(blocks[0].items.iter().all(|p| p.categories.contains(&"arts".to_string())));
}

#[tokio::test]
async fn test_related_recommendations() {
    let items: Vec<Presentation> = (0..8)
        .map(|i| presentation(if i % 2 == 0 { "software" } else { "arts" }, i))
        .collect();
    let stores = FeedStores::in_memory(seeded_store(&items).await);
    let normalizer = Arc::new(KeywordNormalizer::new(&KeywordConfig::default()));
    let engine = RecommendationEngine::new(stores, normalizer, RecommendationConfig::default());

    let related = engine.recommend_related(items[0].id, 4).await.unwrap();
    assert!(related.is_personalized);
    assert!(related.items.len() <= 4);
    assert!(related.items.iter().all(|p| p.id != items[0].id));
    assert!(related.items[0].categories.contains(&"software".to_string()));

    let missing = engine.recommend_related(Uuid::new_v4(), 4).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_stale_preference_no_longer_drives_category_block() {
    let software: Vec<Presentation> = (0..5).map(|i| presentation("software", i)).collect();
    let store = seeded_store(&software).await;

    let viewer = Uuid::new_v4();
    store
        .set_preference(UserPreference {
            user_id: viewer,
            fav_categories: HashMap::from([("software".to_string(), 10.0)]),
            fav_keywords: HashMap::new(),
            updated_at: Some(Utc::now() - Duration::days(365)),
        })
        .await;

    let assembler = assembler(store);
    let ctx = assembler.default_context(Some(viewer));
    let blocks = assembler
        .build_with_rng(&ctx, &mut StdRng::seed_from_u64(13))
        .await
        .unwrap();

    assert!(!blocks.is_empty());
    assert!(blocks.iter().all(|b| b.key != "category-affinity"));
    assert_no_duplicates(&blocks);
}

#[tokio::test]
async fn test_nearby_block_keeps_radius_and_orders_by_distance() {
    // Paris, roughly 1.1 km, 4.4 km and 8.9 km north of the origin
    let near = located(48.86, 2.35);
    let mid = located(48.89, 2.35);
    let edge = located(48.93, 2.35);
    let far = located(49.05, 2.35);
    let unlocated = presentation("urbanism", 1);

    let viewer = Uuid::new_v4();
    let mut own = located(48.851, 2.35);
    own.creator_id = viewer;

    let all = vec![
        edge.clone(),
        far.clone(),
        near.clone(),
        own.clone(),
        unlocated.clone(),
        mid.clone(),
    ];
    let store = seeded_store(&all).await;

    let assembler = assembler(store).with_providers(vec![BlockProvider::NearbyLocation]);
    let ctx = assembler
        .default_context(Some(viewer))
        .with_location(LocationHint::parse("48.85|2.35|10"));
    let blocks = assembler
        .build_with_rng(&ctx, &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].key, "nearby");
    assert!(blocks[0].personalized);
    let ids: Vec<Uuid> = blocks[0].items.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![near.id, mid.id, edge.id]);
    assert!(!ids.contains(&own.id));
}

#[tokio::test]
async fn test_location_cookie_alone_skips_explore_fallback() {
    let mut items: Vec<Presentation> = (0..10).map(|i| presentation("software", i)).collect();
    let nearby = located(48.86, 2.35);
    items.push(nearby.clone());
    let assembler = assembler(seeded_store(&items).await);

    let cookies = HashMap::from([("pp_location".to_string(), "48.85|2.35|10".to_string())]);
    let hints = AnonymousHints::from_request(&cookies, &HashMap::new());
    assert!(hints.location.is_some());

    let ctx = assembler.default_context(None).with_anonymous_hints(hints);
    let blocks = assembler
        .build_with_rng(&ctx, &mut StdRng::seed_from_u64(2))
        .await
        .unwrap();

    assert!(blocks.iter().all(|b| b.key != "anon-explore-fallback"));
    assert_eq!(blocks[0].key, "nearby");
    assert_eq!(ids_of(&blocks[0]), HashSet::from([nearby.id]));
    assert_no_duplicates(&blocks);
}
