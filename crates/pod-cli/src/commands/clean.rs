//! `pod clean`: discard the cache's staging area.

use pod_cache::SystemCache;
use pod_core::error::PodResult;

use super::CommandContext;

pub async fn execute(ctx: &CommandContext) -> PodResult<()> {
    // Opening the cache already clears leftover staging directories.
    let cache = SystemCache::new(ctx.cache_root.clone())?;
    cache.clean_temp()?;
    ctx.output
        .success(&format!("Cleaned staging area under {}", cache.root()));
    Ok(())
}
