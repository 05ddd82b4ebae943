//! `husk deprecate` command implementation.
//!
//! Builds the same request body `npm deprecate` sends: the current document
//! with a `deprecated` message on the chosen version.

use husk_core::error::{HuskError, HuskResult};
use husk_core::types::metadata::{DEPRECATED, VERSIONS};
use husk_registry::PublishEnvelope;
use serde_json::Value;

use super::{require_version, CommandContext};

/// Execute the `husk deprecate` command
pub async fn execute(spec: &str, message: &str, ctx: &CommandContext) -> HuskResult<()> {
    let (package, version) = require_version(spec)?;
    let registry = ctx.registry().await?;
    let doc = registry.document(package).await?;

    if !doc.versions().is_some_and(|versions| versions.contains_key(version)) {
        return Err(HuskError::not_found(format!("version {}@{}", package, version)));
    }

    let mut body = doc.into_value();
    body[VERSIONS][version][DEPRECATED] = Value::String(message.to_string());
    let envelope = PublishEnvelope::from_value(body)?;
    registry.deprecate(package, &envelope).await?;

    if message.is_empty() {
        ctx.output.success(&format!("{}@{} is no longer deprecated", package, version));
    } else {
        ctx.output.success(&format!("Deprecated {}@{}", package, version));
    }
    Ok(())
}
