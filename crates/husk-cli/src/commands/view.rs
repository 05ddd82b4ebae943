//! `husk view` command implementation.

use husk_core::error::HuskResult;

use super::CommandContext;

/// Print hosted metadata with download URLs, as an installing client sees it
pub async fn execute(package: &str, ctx: &CommandContext) -> HuskResult<()> {
    let metadata = ctx.registry().await?.package_metadata(package).await?;
    ctx.output.json(&metadata)
}
