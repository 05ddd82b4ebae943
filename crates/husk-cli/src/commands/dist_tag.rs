//! `husk dist-tag` command implementation.

use husk_core::error::HuskResult;
use serde_json::{Map, Value};

use super::{require_version, CommandContext};

/// `husk dist-tag add <pkg>@<version> <tag>`
pub async fn add(spec: &str, tag: &str, ctx: &CommandContext) -> HuskResult<()> {
    let (package, version) = require_version(spec)?;
    let tags = ctx.registry().await?.put_dist_tag(package, tag, version.as_bytes()).await?;

    ctx.output.success(&format!("{}: {} -> {}", package, tag, version));
    print_tags(&tags, ctx);
    Ok(())
}

/// `husk dist-tag rm <pkg> <tag>`
pub async fn remove(package: &str, tag: &str, ctx: &CommandContext) -> HuskResult<()> {
    let tags = ctx.registry().await?.delete_dist_tag(package, tag).await?;

    ctx.output.success(&format!("{}: removed {}", package, tag));
    print_tags(&tags, ctx);
    Ok(())
}

/// `husk dist-tag ls <pkg>`
pub async fn list(package: &str, ctx: &CommandContext) -> HuskResult<()> {
    let tags = ctx.registry().await?.dist_tags(package).await?;
    print_tags(&tags, ctx);
    Ok(())
}

fn print_tags(tags: &Map<String, Value>, ctx: &CommandContext) {
    for (tag, version) in tags {
        ctx.output.plain(&format!("{}: {}", tag, version.as_str().unwrap_or_default()));
    }
}
