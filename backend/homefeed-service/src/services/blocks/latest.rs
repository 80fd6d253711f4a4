use super::BlockInput;
use crate::error::Result;
use crate::models::HomeFeedBlock;
use tracing::debug;

pub(super) const KEY: &str = "latest";
const TITLE: &str = "Nouveautés";
const POOL_MULTIPLIER: usize = 5;

pub(super) async fn provide(input: &BlockInput<'_>) -> Result<Option<HomeFeedBlock>> {
    let ctx = input.ctx;
    let items = input
        .stores
        .presentations
        .latest_published(ctx.viewer_id(), ctx.cards_per_block() * POOL_MULTIPLIER)
        .await?;

    debug!(block = KEY, candidates = items.len(), "Latest block fetched");
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(HomeFeedBlock::new(KEY, TITLE, items, false)))
}
