//! Home feed block providers.
//!
//! Each provider independently produces at most one titled, ranked block for a
//! viewer. Abstaining (`Ok(None)`) is the normal outcome when the viewer lacks
//! the signal a provider needs. The set is closed: `BlockProvider` lists every
//! strategy and `ordered()` returns them by descending priority.

mod anon_explore;
mod category_affinity;
mod keyword_affinity;
mod latest;
mod nearby;
mod neighbor_affinity;
mod shuffle;
mod trending;

use crate::config::FeedConfig;
use crate::db::FeedStores;
use crate::error::Result;
use crate::models::{HomeFeedBlock, HomeFeedContext};
use crate::services::keywords::KeywordNormalizer;
use crate::services::signals::ViewerSignals;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub use keyword_affinity::score_keyword_candidates;
pub use neighbor_affinity::aggregate_neighbor_scores;
pub use shuffle::shuffle_top_window;
pub use trending::{rank_trending, trending_score};

/// Read-only inputs shared by every provider during one assembly pass
pub struct BlockInput<'a> {
    pub ctx: &'a HomeFeedContext,
    pub stores: &'a FeedStores,
    pub signals: &'a ViewerSignals,
    pub normalizer: &'a KeywordNormalizer,
    pub settings: &'a FeedConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockProvider {
    AnonExploreFallback,
    NeighborAffinity,
    KeywordAffinity,
    CategoryAffinity,
    NearbyLocation,
    Trending,
    LatestPublished,
}

impl BlockProvider {
    pub const ALL: [BlockProvider; 7] = [
        BlockProvider::AnonExploreFallback,
        BlockProvider::NeighborAffinity,
        BlockProvider::KeywordAffinity,
        BlockProvider::CategoryAffinity,
        BlockProvider::NearbyLocation,
        BlockProvider::Trending,
        BlockProvider::LatestPublished,
    ];

    /// Higher runs first
    pub fn priority(&self) -> i32 {
        match self {
            Self::AnonExploreFallback => 100,
            Self::NeighborAffinity => 90,
            Self::KeywordAffinity => 80,
            Self::CategoryAffinity => 70,
            Self::NearbyLocation => 60,
            Self::Trending => 50,
            Self::LatestPublished => 10,
        }
    }

    /// Stable block key exposed to the presentation layer
    pub fn key(&self) -> &'static str {
        match self {
            Self::AnonExploreFallback => anon_explore::KEY,
            Self::NeighborAffinity => neighbor_affinity::KEY,
            Self::KeywordAffinity => keyword_affinity::KEY,
            Self::CategoryAffinity => category_affinity::KEY,
            Self::NearbyLocation => nearby::KEY,
            Self::Trending => trending::KEY,
            Self::LatestPublished => latest::KEY,
        }
    }

    pub fn ordered() -> Vec<BlockProvider> {
        let mut providers = Self::ALL.to_vec();
        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        providers
    }

    pub async fn provide(
        &self,
        input: &BlockInput<'_>,
        rng: &mut StdRng,
    ) -> Result<Option<HomeFeedBlock>> {
        match self {
            Self::AnonExploreFallback => anon_explore::provide(input, rng).await,
            Self::NeighborAffinity => neighbor_affinity::provide(input, rng).await,
            Self::KeywordAffinity => keyword_affinity::provide(input, rng).await,
            Self::CategoryAffinity => category_affinity::provide(input).await,
            Self::NearbyLocation => nearby::provide(input).await,
            Self::Trending => trending::provide(input).await,
            Self::LatestPublished => latest::provide(input).await,
        }
    }
}

impl std::fmt::Display for BlockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
