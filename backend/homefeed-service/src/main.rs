//! Home Feed Service - Main entry point
//!
//! Builds the block-structured home feed and maintains the derived tables
//! it reads from.
//!
//! # Modes
//! - `feed-preview` (default): assemble one feed and print it as JSON
//! - `neighbor-recompute`: rebuild every presentation's neighbor list
//! - `embedding-index`: refresh embeddings of changed presentations
//! - `preference-recompute`: rebuild one user's preference profile from history
//! - `migrate`: apply the embedded schema migrations

use anyhow::Result;
use chrono::Utc;
use homefeed_service::jobs::{EmbeddingBatchJob, NeighborBatchConfig, NeighborBatchJob};
use homefeed_service::models::LocationHint;
use homefeed_service::services::embedding::{EmbeddingGenerator, EmbeddingIndexer, HttpEmbeddingGenerator};
use homefeed_service::services::{PreferenceLearner, PreferenceService};
use homefeed_service::{
    Config, FeedStores, HomeFeedAssembler, KeywordNormalizer, PresentationNeighborRecomputeService,
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Service run mode
#[derive(Debug, Clone, PartialEq)]
enum RunMode {
    FeedPreview,
    NeighborRecompute,
    EmbeddingIndex,
    PreferenceRecompute,
    Migrate,
}

impl RunMode {
    fn from_args() -> Self {
        match arg_value("--mode").as_deref() {
            None | Some("feed-preview") => RunMode::FeedPreview,
            Some("neighbor-recompute") => RunMode::NeighborRecompute,
            Some("embedding-index") => RunMode::EmbeddingIndex,
            Some("preference-recompute") => RunMode::PreferenceRecompute,
            Some("migrate") => RunMode::Migrate,
            Some(other) => {
                warn!("Unknown mode '{}', using default 'feed-preview'", other);
                RunMode::FeedPreview
            }
        }
    }
}

/// Value following `name` on the command line
fn arg_value(name: &str) -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn arg_uuid(name: &str) -> Result<Option<Uuid>> {
    arg_value(name)
        .map(|raw| Uuid::parse_str(&raw).map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", name, raw, e)))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "homefeed_service=debug,sqlx=warn,info".into());
    if env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mode = RunMode::from_args();
    info!("Starting Home Feed Service in {:?} mode", mode);

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            anyhow::anyhow!("Database connection error: {}", e)
        })?;
    info!("Database connection pool initialized");

    if mode == RunMode::Migrate {
        homefeed_service::migrations::run_all(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("Database migrations failed: {}", e))?;
        return Ok(());
    }

    let stores = FeedStores::postgres(pool);
    let normalizer = Arc::new(KeywordNormalizer::new(&config.keywords));

    match mode {
        RunMode::FeedPreview => run_feed_preview(config, stores, normalizer).await,
        RunMode::NeighborRecompute => run_neighbor_recompute(config, stores).await,
        RunMode::EmbeddingIndex => run_embedding_index(config, stores).await,
        RunMode::PreferenceRecompute => run_preference_recompute(config, stores, normalizer).await,
        RunMode::Migrate => Ok(()),
    }
}

/// Assemble one feed for `--viewer <uuid>` (anonymous when absent)
async fn run_feed_preview(
    config: Config,
    stores: FeedStores,
    normalizer: Arc<KeywordNormalizer>,
) -> Result<()> {
    let viewer_id = arg_uuid("--viewer")?;
    let location = arg_value("--location").and_then(|raw| LocationHint::parse(&raw));

    let assembler = HomeFeedAssembler::new(stores, normalizer, config.feed.clone())
        .with_preference_config(config.preferences.clone());
    let ctx = assembler.default_context(viewer_id).with_location(location);
    let blocks = assembler.build(&ctx).await.map_err(|e| {
        error!("Feed assembly failed: {}", e);
        anyhow::anyhow!("Feed assembly error: {}", e)
    })?;

    for block in &blocks {
        info!(key = %block.key, items = block.items.len(), "{}", block.title);
    }
    println!("{}", serde_json::to_string_pretty(&blocks)?);
    Ok(())
}

async fn run_neighbor_recompute(config: Config, stores: FeedStores) -> Result<()> {
    let job = NeighborBatchJob::new(
        NeighborBatchConfig::from_config(&config),
        PresentationNeighborRecomputeService::new(stores),
    );
    let stats = job.run().await.map_err(|e| {
        error!("Neighbor recompute failed: {}", e);
        anyhow::anyhow!("Neighbor recompute error: {}", e)
    })?;

    if stats.outcome.skipped_missing_vector > 0 {
        warn!(
            "{} presentations skipped without a usable vector",
            stats.outcome.skipped_missing_vector
        );
    }
    Ok(())
}

async fn run_embedding_index(config: Config, stores: FeedStores) -> Result<()> {
    let generator = match HttpEmbeddingGenerator::from_config(&config.embedding)? {
        Some(generator) => Some(Arc::new(generator) as Arc<dyn EmbeddingGenerator>),
        None => {
            warn!("EMBEDDING_API_URL not set, nothing to index");
            None
        }
    };

    let indexer = EmbeddingIndexer::new(
        stores.embeddings.clone(),
        generator,
        &config.embedding.model,
        config.embedding.dims,
    );
    let stats = EmbeddingBatchJob::new(stores, indexer, config.neighbors.batch_size)
        .run()
        .await
        .map_err(|e| {
            error!("Embedding index pass failed: {}", e);
            anyhow::anyhow!("Embedding index error: {}", e)
        })?;

    if stats.failed > 0 {
        warn!("Embedding index pass completed with {} failures", stats.failed);
    }
    Ok(())
}

/// Rebuild the profile of `--user <uuid>` from interaction history
async fn run_preference_recompute(
    config: Config,
    stores: FeedStores,
    normalizer: Arc<KeywordNormalizer>,
) -> Result<()> {
    let Some(user_id) = arg_uuid("--user")? else {
        anyhow::bail!("--user <uuid> is required for preference-recompute mode");
    };

    let service = PreferenceService::new(stores, PreferenceLearner::new(config.preferences.clone(), normalizer));
    let preference = service.recompute_user(user_id, Utc::now()).await?;
    info!(
        user_id = %user_id,
        categories = preference.fav_categories.len(),
        keywords = preference.fav_keywords.len(),
        "Preference profile rebuilt"
    );
    Ok(())
}
