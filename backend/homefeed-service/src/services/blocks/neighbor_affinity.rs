use super::shuffle::shuffle_top_window;
use super::BlockInput;
use crate::error::Result;
use crate::models::{HomeFeedBlock, NeighborRow, Presentation};
use rand::rngs::StdRng;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

pub(super) const KEY: &str = "neighbor-affinity";

const MIN_NEIGHBORS_PER_SEED: usize = 8;
const MIN_CANDIDATES: usize = 6;
const MAX_RANKED: usize = 96;
const MIN_WINDOW: usize = 36;
const WINDOW_MULTIPLIER: usize = 6;

fn title_for(seed_count: usize) -> &'static str {
    match seed_count {
        n if n >= 3 => "Inspiré de vos dernières visites",
        2 => "Dans la lignée de vos projets consultés",
        _ => "Projets similaires",
    }
}

/// Σ over seeds of max(1, seeds − index) × 1/(1 + rank).
/// `neighbor_lists[i]` holds the rows of `seeds[i]`; seeds never score.
pub fn aggregate_neighbor_scores(seeds: &[Uuid], neighbor_lists: &[Vec<NeighborRow>]) -> Vec<(Uuid, f64)> {
    let seed_set: HashSet<&Uuid> = seeds.iter().collect();
    let seed_count = seeds.len();
    let mut scores: HashMap<Uuid, f64> = HashMap::new();

    for (index, rows) in neighbor_lists.iter().enumerate().take(seed_count) {
        let seed_weight = seed_count.saturating_sub(index).max(1) as f64;

        // Best rank per neighbor; "any model" lookups may repeat a neighbor
        let mut best_rank: HashMap<Uuid, i32> = HashMap::new();
        for row in rows {
            if seed_set.contains(&row.neighbor_id) {
                continue;
            }
            let rank = row.rank.max(1);
            best_rank
                .entry(row.neighbor_id)
                .and_modify(|r| *r = (*r).min(rank))
                .or_insert(rank);
        }

        for (neighbor_id, rank) in best_rank {
            *scores.entry(neighbor_id).or_insert(0.0) += seed_weight / (1.0 + rank as f64);
        }
    }

    let mut ranked: Vec<(Uuid, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

pub(super) async fn provide(
    input: &BlockInput<'_>,
    rng: &mut StdRng,
) -> Result<Option<HomeFeedBlock>> {
    let ctx = input.ctx;
    let seeds = &input.signals.neighbor_seeds;
    if seeds.is_empty() {
        return Ok(None);
    }

    let cards = ctx.cards_per_block();
    let k = MIN_NEIGHBORS_PER_SEED.max(cards);
    let neighbors = &input.stores.neighbors;
    let model = &input.settings.neighbor_model;

    let mut neighbor_lists = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let mut rows = neighbors.top_neighbors(*seed, Some(model.clone()), k).await?;
        if rows.is_empty() {
            rows = neighbors.top_neighbors(*seed, None, k).await?;
        }
        neighbor_lists.push(rows);
    }

    let mut ranked = aggregate_neighbor_scores(seeds, &neighbor_lists);
    if ranked.len() < MIN_CANDIDATES {
        debug!(block = KEY, candidates = ranked.len(), "Not enough neighbor candidates");
        return Ok(None);
    }
    ranked.truncate(MAX_RANKED);

    let ids: Vec<Uuid> = ranked.iter().map(|(id, _)| *id).collect();
    let mut by_id: HashMap<Uuid, Presentation> = input
        .stores
        .presentations
        .by_ids(&ids)
        .await?
        .into_iter()
        .filter(|p| p.is_visible() && Some(p.creator_id) != ctx.viewer_id())
        .map(|p| (p.id, p))
        .collect();

    let mut items: Vec<Presentation> = ranked
        .iter()
        .filter_map(|(id, _)| by_id.remove(id))
        .collect();
    if items.len() < MIN_CANDIDATES {
        debug!(block = KEY, candidates = items.len(), "Neighbor candidates filtered out");
        return Ok(None);
    }

    shuffle_top_window(&mut items, MIN_WINDOW.max(cards * WINDOW_MULTIPLIER), rng);

    debug!(
        block = KEY,
        seeds = seeds.len(),
        candidates = items.len(),
        "Neighbor affinity block ranked"
    );
    Ok(Some(HomeFeedBlock::new(KEY, title_for(seeds.len()), items, true)))
}
