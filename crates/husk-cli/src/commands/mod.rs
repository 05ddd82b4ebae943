//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking the shared [`CommandContext`],
//! which owns the loaded configuration and builds the registry and proxy
//! over the configured store.

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use husk_config::{ConfigLoader, ConfigSource, HuskToml};
use husk_core::error::{HuskError, HuskResult};
use husk_core::utils::{SharedClock, SystemClock};
use husk_proxy::ProxyCache;
use husk_registry::HostedRegistry;
use husk_store::{FsStorage, SharedStorage};
use tracing::info;

pub mod config;
pub mod deprecate;
pub mod dist_tag;
pub mod fetch;
pub mod publish;
pub mod unpublish;
pub mod view;


use crate::{output::OutputHandler, Commands, DistTagAction};

/// Hosted and proxied packages share names and key layout, so each gets its
/// own directory under the storage root
const HOSTED_DIR: &str = "hosted";
const PROXY_DIR: &str = "proxy";

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub output: OutputHandler,
    pub config: HuskToml,
    pub sources: Vec<ConfigSource>,
    pub clock: SharedClock,
}

impl CommandContext {
    /// Load configuration for the current directory
    pub async fn load(overrides: HashMap<String, String>) -> HuskResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| HuskError::io("Failed to get current directory".to_string(), e))?;
        let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|path| HuskError::ConfigValidation {
            field: "cwd".to_string(),
            reason: format!("{} is not valid UTF-8", path.display()),
        })?;

        let (config, sources) = ConfigLoader::new(cwd.clone()).load(overrides).await?;

        Ok(Self {
            cwd,
            output: OutputHandler::new(),
            config,
            sources,
            clock: Arc::new(SystemClock),
        })
    }

    /// Storage root, resolved against the working directory
    pub fn storage_root(&self) -> Utf8PathBuf {
        let root = &self.config.storage.root;
        if root.is_absolute() {
            root.clone()
        } else {
            self.cwd.join(root)
        }
    }

    /// Store of packages published here
    pub fn hosted_root(&self) -> Utf8PathBuf {
        self.storage_root().join(HOSTED_DIR)
    }

    /// Store of documents and tarballs mirrored from upstream
    pub fn proxy_root(&self) -> Utf8PathBuf {
        self.storage_root().join(PROXY_DIR)
    }

    async fn open_storage(root: Utf8PathBuf) -> HuskResult<SharedStorage> {
        Ok(Arc::new(FsStorage::open(root).await?))
    }

    pub async fn registry(&self) -> HuskResult<HostedRegistry> {
        Ok(HostedRegistry::new(
            Self::open_storage(self.hosted_root()).await?,
            self.clock.clone(),
            self.config.server.public_base(),
        ))
    }

    pub async fn proxy(&self) -> HuskResult<ProxyCache> {
        ProxyCache::from_config(
            &self.config.proxy,
            &self.config.server,
            Self::open_storage(self.proxy_root()).await?,
            self.clock.clone(),
        )
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> HuskResult<()> {
    match command {
        Commands::Publish { path } => {
            info!("Publishing {}", path.display());
            publish::execute(&path, ctx).await
        },
        Commands::DistTag { action } => match action {
            DistTagAction::Add { spec, tag } => dist_tag::add(&spec, &tag, ctx).await,
            DistTagAction::Rm { package, tag } => dist_tag::remove(&package, &tag, ctx).await,
            DistTagAction::Ls { package } => dist_tag::list(&package, ctx).await,
        },
        Commands::Deprecate { spec, message } => deprecate::execute(&spec, &message, ctx).await,
        Commands::Unpublish { spec } => unpublish::execute(&spec, ctx).await,
        Commands::View { package } => view::execute(&package, ctx).await,
        Commands::Fetch { target, output } => fetch::execute(&target, output.as_deref(), ctx).await,
        Commands::Config => config::execute(ctx).await,
    }
}

/// Split `name@version`; the leading `@` of a scope is part of the name
pub fn split_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.rfind('@') {
        Some(idx) if idx > 0 => (&spec[..idx], Some(&spec[idx + 1..])),
        _ => (spec, None),
    }
}

/// `name@version` with a mandatory version
pub fn require_version(spec: &str) -> HuskResult<(&str, &str)> {
    match split_spec(spec) {
        (name, Some(version)) if !version.is_empty() => Ok((name, version)),
        _ => Err(HuskError::bad_request(format!("expected <pkg>@<version>, got '{}'", spec))),
    }
}
