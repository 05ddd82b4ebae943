//! # husk
//!
//! Operator CLI for the Husk package registry.
//!
//! Drives the hosted registry operations (publish, dist-tags, deprecate,
//! unpublish) and the upstream proxy cache against the filesystem store
//! configured in `husk.toml`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use husk_core::error::{HuskError, HuskResult};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Package registry with a read-through upstream cache
#[derive(Parser)]
#[command(name = "husk", version, about = "Package registry with a read-through upstream cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Storage root, overrides `storage.root`
    #[arg(long, global = true, value_name = "DIR")]
    pub storage: Option<String>,

    /// Upstream registry, overrides `proxy.upstream`
    #[arg(long, global = true, value_name = "URL")]
    pub upstream: Option<String>,

    /// Public address, overrides `server.public_url`
    #[arg(long, global = true, value_name = "URL")]
    pub public_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a `.tgz`, a publish envelope (`.json`) or a package directory
    Publish { path: PathBuf },
    /// Manage dist-tags
    DistTag {
        #[command(subcommand)]
        action: DistTagAction,
    },
    /// Mark a version as deprecated
    Deprecate {
        /// `<pkg>@<version>`
        spec: String,
        message: String,
    },
    /// Remove one version (`<pkg>@<version>`) or the whole package
    Unpublish { spec: String },
    /// Show hosted metadata as clients receive it
    View { package: String },
    /// Fetch metadata, or a `<pkg>/-/<file>.tgz` asset, through the proxy cache
    Fetch {
        target: String,
        /// Write the fetched body to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum DistTagAction {
    /// Point `tag` at `<pkg>@<version>`
    Add { spec: String, tag: String },
    /// Remove a tag
    Rm { package: String, tag: String },
    /// List tags
    Ls { package: String },
}

impl Cli {
    fn overrides(&self) -> HashMap<String, String> {
        let mut overrides = HashMap::new();
        if let Some(storage) = &self.storage {
            overrides.insert("storage".to_string(), storage.clone());
        }
        if let Some(upstream) = &self.upstream {
            overrides.insert("upstream".to_string(), upstream.clone());
        }
        if let Some(public_url) = &self.public_url {
            overrides.insert("public_url".to_string(), public_url.clone());
        }
        overrides
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("{}", ErrorFormatter::new().format_error(&e));
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> HuskResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| HuskError::io("Failed to create async runtime".to_string(), e))?;

    rt.block_on(async {
        let ctx = CommandContext::load(cli.overrides()).await?;
        debug!(storage = %ctx.config.storage.root, "starting husk v{}", env!("CARGO_PKG_VERSION"));
        commands::dispatch_command(cli.command, &ctx).await
    })
}

/// Logs go to stderr so command output on stdout stays machine readable
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "husk={level},husk_core={level},husk_config={level},husk_store={level},husk_registry={level},husk_proxy={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
