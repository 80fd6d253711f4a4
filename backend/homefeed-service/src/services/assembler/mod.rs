use crate::config::{FeedConfig, PreferenceConfig};
use crate::db::FeedStores;
use crate::error::Result;
use crate::models::{BlockItemStats, HomeFeedBlock, HomeFeedContext, Presentation};
use crate::services::blocks::{BlockInput, BlockProvider};
use crate::services::keywords::KeywordNormalizer;
use crate::services::signals::ViewerSignalProvider;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Home feed assembly: providers by priority, cross-block dedup, per-block stats
pub struct HomeFeedAssembler {
    stores: FeedStores,
    signals: ViewerSignalProvider,
    normalizer: Arc<KeywordNormalizer>,
    settings: FeedConfig,
    providers: Vec<BlockProvider>,
}

impl HomeFeedAssembler {
    pub fn new(stores: FeedStores, normalizer: Arc<KeywordNormalizer>, settings: FeedConfig) -> Self {
        Self {
            signals: ViewerSignalProvider::new(stores.clone(), normalizer.clone()),
            stores,
            normalizer,
            settings,
            providers: BlockProvider::ordered(),
        }
    }

    /// Decay settings used when reading stored viewer preferences
    pub fn with_preference_config(mut self, config: PreferenceConfig) -> Self {
        self.signals = self.signals.with_preference_config(config);
        self
    }

    /// Restricts assembly to a subset of providers, still run by priority
    pub fn with_providers(mut self, mut providers: Vec<BlockProvider>) -> Self {
        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        providers.dedup();
        self.providers = providers;
        self
    }

    /// Context with the configured defaults for block size and count
    pub fn default_context(&self, viewer_id: Option<Uuid>) -> HomeFeedContext {
        let ctx = HomeFeedContext::new(
            viewer_id,
            self.settings.default_cards_per_block,
            self.settings.default_max_blocks,
        );
        match self.settings.creator_cap {
            Some(cap) => ctx.with_creator_cap(cap),
            None => ctx,
        }
    }

    pub async fn build(&self, ctx: &HomeFeedContext) -> Result<Vec<HomeFeedBlock>> {
        let mut rng = match self.settings.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.build_with_rng(ctx, &mut rng).await
    }

    pub async fn build_with_rng(
        &self,
        ctx: &HomeFeedContext,
        rng: &mut StdRng,
    ) -> Result<Vec<HomeFeedBlock>> {
        let started = Instant::now();
        let signals = self.signals.resolve(ctx).await?;
        let input = BlockInput {
            ctx,
            stores: &self.stores,
            signals: &signals,
            normalizer: &self.normalizer,
            settings: &self.settings,
        };

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut blocks = Vec::with_capacity(ctx.max_blocks());

        for provider in &self.providers {
            if blocks.len() >= ctx.max_blocks() {
                break;
            }

            let Some(mut block) = provider.provide(&input, rng).await? else {
                debug!(provider = %provider, "Provider abstained");
                continue;
            };

            let items = select_items(
                std::mem::take(&mut block.items),
                &mut seen,
                ctx.cards_per_block(),
                ctx.creator_cap(),
            );
            if items.is_empty() {
                debug!(provider = %provider, "Block emptied by deduplication");
                continue;
            }

            let ids: Vec<Uuid> = items.iter().map(|p| p.id).collect();
            let counts = self.stores.engagement.counts_for_ids(&ids).await?;
            let stats: HashMap<Uuid, BlockItemStats> = ids
                .iter()
                .map(|id| {
                    let c = counts.get(id).copied().unwrap_or_default();
                    (
                        *id,
                        BlockItemStats {
                            likes: c.likes,
                            comments: c.comments,
                        },
                    )
                })
                .collect();

            debug!(block = %block.key, items = items.len(), "Block selected");
            blocks.push(block.with_items(items, stats));
        }

        info!(
            viewer = ?ctx.viewer_id(),
            blocks = blocks.len(),
            items = seen.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Home feed assembled"
        );
        Ok(blocks)
    }
}

/// First occurrence wins across the feed; optional per-creator cap inside the block
fn select_items(
    candidates: Vec<Presentation>,
    seen: &mut HashSet<Uuid>,
    limit: usize,
    creator_cap: Option<usize>,
) -> Vec<Presentation> {
    let mut per_creator: HashMap<Uuid, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(limit);

    for item in candidates {
        if selected.len() >= limit {
            break;
        }
        if seen.contains(&item.id) {
            continue;
        }
        if let Some(cap) = creator_cap {
            let count = per_creator.entry(item.creator_id).or_insert(0);
            if *count >= cap {
                continue;
            }
            *count += 1;
        }
        seen.insert(item.id);
        selected.push(item);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(creator_id: Uuid) -> Presentation {
        Presentation {
            id: Uuid::new_v4(),
            creator_id,
            title: "Projet".to_string(),
            goal: None,
            description: None,
            categories: Vec::new(),
            keywords: None,
            created_at: Utc::now(),
            updated_at: None,
            is_published: true,
            is_deleted: false,
            view_count: 0,
            location: None,
        }
    }

    #[test]
    fn test_select_items_dedups_across_blocks() {
        let a = item(Uuid::new_v4());
        let b = item(Uuid::new_v4());
        let c = item(Uuid::new_v4());
        let mut seen = HashSet::new();

        let first = select_items(vec![a.clone(), b.clone()], &mut seen, 8, None);
        assert_eq!(first.len(), 2);

        let second = select_items(vec![b.clone(), c.clone(), a.clone()], &mut seen, 8, None);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, c.id);
    }

    #[test]
    fn test_select_items_drops_internal_duplicates() {
        let a = item(Uuid::new_v4());
        let mut seen = HashSet::new();
        let selected = select_items(vec![a.clone(), a.clone()], &mut seen, 8, None);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_select_items_truncates() {
        let items: Vec<Presentation> = (0..20).map(|_| item(Uuid::new_v4())).collect();
        let mut seen = HashSet::new();
        let selected = select_items(items.clone(), &mut seen, 8, None);
        assert_eq!(selected.len(), 8);
        assert_eq!(seen.len(), 8);
        // Truncated items stay available to later blocks
        assert!(!seen.contains(&items[8].id));
    }

    #[test]
    fn test_creator_cap() {
        let creator = Uuid::new_v4();
        let items = vec![item(creator), item(creator), item(creator), item(Uuid::new_v4())];
        let mut seen = HashSet::new();
        let selected = select_items(items.clone(), &mut seen, 8, Some(2));
        assert_eq!(selected.len(), 3);
        assert!(!seen.contains(&items[2].id));
    }
}
