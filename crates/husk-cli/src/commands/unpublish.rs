//! `husk unpublish` command implementation.
//!
//! `<pkg>@<version>` sends the document minus that version, as
//! `npm unpublish` does; a bare `<pkg>` removes everything stored for it.

use husk_core::error::{HuskError, HuskResult};
use husk_core::types::metadata::VERSIONS;
use husk_registry::PublishEnvelope;

use super::{split_spec, CommandContext};

/// Execute the `husk unpublish` command
pub async fn execute(spec: &str, ctx: &CommandContext) -> HuskResult<()> {
    let registry = ctx.registry().await?;

    let (package, version) = match split_spec(spec) {
        (package, Some(version)) if !version.is_empty() => (package, version),
        (package, _) => {
            let removed = registry.unpublish_all(package).await?;
            ctx.output.success(&format!("Unpublished {} ({} files removed)", package, removed));
            return Ok(());
        },
    };

    let mut body = registry.document(package).await?.into_value();
    let listed = body
        .get_mut(VERSIONS)
        .and_then(|versions| versions.as_object_mut())
        .and_then(|versions| versions.remove(version));
    if listed.is_none() {
        return Err(HuskError::not_found(format!("version {}@{}", package, version)));
    }

    let envelope = PublishEnvelope::from_value(body)?;
    let (_, removed) = registry.unpublish_one(package, &envelope).await?;
    ctx.output.success(&format!("Unpublished {}@{}", package, removed));
    Ok(())
}
