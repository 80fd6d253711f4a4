use super::BlockInput;
use crate::error::Result;
use crate::models::HomeFeedBlock;
use tracing::debug;

pub(super) const KEY: &str = "category-affinity";
const TITLE: &str = "Dans vos catégories";

const MIN_POOL: usize = 48;
const POOL_MULTIPLIER: usize = 4;

/// Published items in the viewer's categories, repository order kept.
/// Logged-in viewers fall back to their own categories when the primary list matches nothing.
pub(super) async fn provide(input: &BlockInput<'_>) -> Result<Option<HomeFeedBlock>> {
    let ctx = input.ctx;
    let categories = &input.signals.categories;
    if categories.is_empty() {
        return Ok(None);
    }

    let pool = MIN_POOL.max(ctx.cards_per_block() * POOL_MULTIPLIER);
    let presentations = &input.stores.presentations;

    let mut items = if categories.primary.is_empty() {
        Vec::new()
    } else {
        presentations
            .published_in_categories(&categories.primary, ctx.viewer_id(), pool)
            .await?
    };

    if items.is_empty() && !ctx.is_anonymous() && !categories.fallback.is_empty() {
        items = presentations
            .published_in_categories(&categories.fallback, ctx.viewer_id(), pool)
            .await?;
    }

    debug!(
        block = KEY,
        from_preferences = categories.primary_from_preferences,
        candidates = items.len(),
        "Category affinity block fetched"
    );

    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(HomeFeedBlock::new(KEY, TITLE, items, true)))
}
