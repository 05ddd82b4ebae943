//! `husk publish` command implementation.
//!
//! Accepts a package in any of the shapes it reaches the registry in: a
//! packed `.tgz`, a publish envelope saved as `.json`, or a directory that is
//! packed on the fly.

use std::path::Path;

use bytes::Bytes;
use husk_core::error::{HuskError, HuskResult};
use husk_core::types::metadata::{DIST_TAGS, LATEST};
use husk_core::MetadataDocument;
use husk_registry::PublishEnvelope;
use husk_store::create_tarball;

use super::CommandContext;

/// Execute the `husk publish` command
pub async fn execute(path: &Path, ctx: &CommandContext) -> HuskResult<()> {
    let registry = ctx.registry().await?;

    let doc = if path.is_dir() {
        let mut tarball = Vec::new();
        create_tarball(&mut tarball, path)?;
        registry.put_tarball(Bytes::from(tarball)).await?
    } else {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| HuskError::io(format!("Failed to read {}", path.display()), e))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("tgz") => registry.put_tarball(Bytes::from(body)).await?,
            Some("json") => {
                let envelope = PublishEnvelope::from_slice(&body)?;
                let name = envelope.name()?.to_string();
                registry.put_package(&name, None, &body).await?
            },
            _ => {
                return Err(HuskError::bad_request(format!(
                    "{} is neither a .tgz, a .json envelope nor a directory",
                    path.display()
                )))
            },
        }
    };

    ctx.output.success(&format!("Published {}", describe(&doc)));
    Ok(())
}

/// `name@latest (n versions)`
fn describe(doc: &MetadataDocument) -> String {
    let name = doc.name().unwrap_or("<unnamed>");
    let latest = doc
        .get(&[DIST_TAGS, LATEST])
        .and_then(|v| v.as_str())
        .unwrap_or("?");
    let count = doc.versions().map_or(0, |versions| versions.len());
    format!("{}@{} ({} versions)", name, latest, count)
}
