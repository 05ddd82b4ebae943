//! `husk config` command implementation.

use husk_config::toml::serialize_husk_toml;
use husk_config::ConfigSource;
use husk_core::error::HuskResult;

use super::CommandContext;

/// Print the effective configuration and where it came from
pub async fn execute(ctx: &CommandContext) -> HuskResult<()> {
    for source in &ctx.sources {
        let origin = match source {
            ConfigSource::Defaults => "defaults".to_string(),
            ConfigSource::Global(path) => format!("global file {}", path),
            ConfigSource::Project(path) => format!("project file {}", path),
            ConfigSource::Environment(key) => format!("environment {}", key),
            ConfigSource::CommandLine => "command line".to_string(),
        };
        ctx.output.info(&format!("# from {}", origin));
    }

    let mut config = ctx.config.clone();
    if config.proxy.token.is_some() {
        config.proxy.token = Some("********".to_string());
    }
    ctx.output.plain(&serialize_husk_toml(&config)?);
    Ok(())
}
