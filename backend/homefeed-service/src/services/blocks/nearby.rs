use super::BlockInput;
use crate::error::Result;
use crate::models::HomeFeedBlock;
use tracing::debug;

pub(super) const KEY: &str = "nearby";
const TITLE: &str = "Près de chez vous";

const MIN_POOL: usize = 48;
const POOL_MULTIPLIER: usize = 4;

pub(super) async fn provide(input: &BlockInput<'_>) -> Result<Option<HomeFeedBlock>> {
    let ctx = input.ctx;
    let Some(location) = ctx.location() else {
        return Ok(None);
    };

    let pool = MIN_POOL.max(ctx.cards_per_block() * POOL_MULTIPLIER);
    let items = input
        .stores
        .presentations
        .published_near(
            location.lat,
            location.lng,
            location.radius_km,
            ctx.viewer_id(),
            pool,
        )
        .await?;

    debug!(
        block = KEY,
        radius_km = location.radius_km,
        candidates = items.len(),
        "Nearby block fetched"
    );

    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(HomeFeedBlock::new(KEY, TITLE, items, true)))
}
