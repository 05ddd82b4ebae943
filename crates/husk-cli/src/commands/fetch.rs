//! `husk fetch` command implementation.
//!
//! Reads through the proxy cache, so a successful fetch also warms the
//! cache for later installs.

use std::path::Path;

use husk_core::error::{HuskError, HuskResult};
use serde_json::Value;

use super::CommandContext;

/// Execute the `husk fetch` command
pub async fn execute(target: &str, output: Option<&Path>, ctx: &CommandContext) -> HuskResult<()> {
    let proxy = ctx.proxy().await?;

    if target.contains("/-/") {
        let asset = proxy.get_asset(target).await?;
        match output {
            Some(path) => write(path, &asset.body).await?,
            None => ctx.output.info(&format!("{} ({} bytes) cached", asset.path, asset.body.len())),
        }
        return Ok(());
    }

    let package = proxy.get_package(target).await?;
    if let Some(modified) = &package.last_modified {
        ctx.output.info(&format!("upstream last modified {}", modified));
    }
    match output {
        Some(path) => write(path, &package.body).await,
        None => {
            let value: Value = serde_json::from_slice(&package.body)?;
            ctx.output.json(&value)
        },
    }
}

async fn write(path: &Path, body: &[u8]) -> HuskResult<()> {
    tokio::fs::write(path, body)
        .await
        .map_err(|e| HuskError::io(format!("Failed to write {}", path.display()), e))
}
