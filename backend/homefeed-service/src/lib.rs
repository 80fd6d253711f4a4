pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod migrations;
pub mod models;
pub mod services;

pub use config::Config;
pub use db::{FeedStores, InMemoryStore};
pub use error::{AppError, Result};
pub use services::{
    BlockProvider, HomeFeedAssembler, KeywordNormalizer, PresentationNeighborRecomputeService,
    RecommendationEngine,
};
