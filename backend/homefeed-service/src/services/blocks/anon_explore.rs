use super::shuffle::shuffle_top_window;
use super::BlockInput;
use crate::error::Result;
use crate::models::HomeFeedBlock;
use rand::rngs::StdRng;
use tracing::debug;

pub(super) const KEY: &str = "anon-explore-fallback";
const TITLE: &str = "Explorer sur Propon";

const MIN_POOL: usize = 56;
const POOL_MULTIPLIER: usize = 7;
const MIN_WINDOW: usize = 24;
const WINDOW_MULTIPLIER: usize = 3;

/// First-visit block: only for anonymous visitors carrying no signal at all
pub(super) async fn provide(
    input: &BlockInput<'_>,
    rng: &mut StdRng,
) -> Result<Option<HomeFeedBlock>> {
    let ctx = input.ctx;
    if !ctx.has_no_anonymous_signal() {
        return Ok(None);
    }

    let cards = ctx.cards_per_block();
    let mut items = input
        .stores
        .presentations
        .latest_published(None, MIN_POOL.max(cards * POOL_MULTIPLIER))
        .await?;
    if items.is_empty() {
        return Ok(None);
    }

    shuffle_top_window(&mut items, MIN_WINDOW.max(cards * WINDOW_MULTIPLIER), rng);

    debug!(block = KEY, candidates = items.len(), "Explore fallback block built");
    Ok(Some(HomeFeedBlock::new(KEY, TITLE, items, false)))
}
