//! Configuration layering, fallback logic, and environment overrides
//!
//! Layers, lowest priority first: built-in defaults, `~/.husk/config.toml`,
//! the nearest `husk.toml` above the working directory, `HUSK_*` environment
//! variables, command-line flags.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use husk_core::error::HuskError;
use tracing::debug;

use crate::toml::{parse_husk_toml, validate_config, HuskToml};
use crate::ConfigResult;

/// Project configuration file name
pub const CONFIG_FILE: &str = "husk.toml";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
#[derive(Debug, Default)]
pub struct ConfigLayering {
    /// Global configuration table
    global_config: Option<toml::Table>,
    /// Project configuration table
    project_config: Option<toml::Table>,
    /// Environment overrides
    env_overrides: HashMap<String, String>,
    /// CLI flag overrides
    cli_overrides: HashMap<String, String>,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Built-in defaults
    Defaults,
    /// Global config file
    Global(Utf8PathBuf),
    /// Project husk.toml file
    Project(Utf8PathBuf),
    /// Environment variable
    Environment(String),
    /// CLI flag
    CommandLine,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Load the effective configuration and the sources that contributed to it
    pub async fn load(
        &self,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<(HuskToml, Vec<ConfigSource>)> {
        let mut layering = ConfigLayering::new();
        let mut sources = vec![ConfigSource::Defaults];

        if let Some(path) = self.global_config_path()? {
            if path.exists() {
                layering.global_config = Some(read_table(&path).await?);
                sources.push(ConfigSource::Global(path));
            }
        }

        if let Some(path) = self.resolve_config_path(CONFIG_FILE) {
            layering.project_config = Some(read_table(&path).await?);
            sources.push(ConfigSource::Project(path));
        }

        layering.env_overrides = ConfigLayering::collect_env_overrides();
        for key in layering.env_overrides.keys() {
            sources.push(ConfigSource::Environment(key.clone()));
        }

        if !cli_overrides.is_empty() {
            sources.push(ConfigSource::CommandLine);
        }
        layering.cli_overrides = cli_overrides;

        let config = layering.merge()?;
        debug!(?sources, "loaded configuration");
        Ok((config, sources))
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
            current = dir.parent();
        }

        None
    }

    /// `~/.husk/config.toml`, if a home directory is known
    pub fn global_config_path(&self) -> ConfigResult<Option<Utf8PathBuf>> {
        let Some(home_dir) = dirs::home_dir() else {
            return Ok(None);
        };

        let home = Utf8PathBuf::try_from(home_dir).map_err(|e| HuskError::ConfigValidation {
            field: "home_dir".to_string(),
            reason: format!("Invalid home directory path: {}", e),
        })?;

        Ok(Some(home.join(".husk").join("config.toml")))
    }
}

impl ConfigLayering {
    /// Create a new configuration layering system
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, table: toml::Table) -> Self {
        self.global_config = Some(table);
        self
    }

    pub fn with_project(mut self, table: toml::Table) -> Self {
        self.project_config = Some(table);
        self
    }

    pub fn with_env(mut self, overrides: HashMap<String, String>) -> Self {
        self.env_overrides = overrides;
        self
    }

    pub fn with_cli(mut self, overrides: HashMap<String, String>) -> Self {
        self.cli_overrides = overrides;
        self
    }

    /// Merge all layers into a validated configuration
    pub fn merge(self) -> ConfigResult<HuskToml> {
        let mut table = self.global_config.unwrap_or_default();
        if let Some(project) = self.project_config {
            merge_tables(&mut table, project);
        }

        let mut config: HuskToml = toml::Value::Table(table).try_into().map_err(
            |e: toml::de::Error| HuskError::TomlParse {
                message: e.message().to_string(),
                line: 0,
                column: 0,
            },
        )?;

        Self::apply_env_overrides(&mut config, &self.env_overrides)?;
        Self::apply_cli_overrides(&mut config, &self.cli_overrides)?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut HuskToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "HUSK_UPSTREAM" => config.proxy.upstream = value.clone(),
                "HUSK_UPSTREAM_TOKEN" => config.proxy.token = Some(value.clone()),
                "HUSK_PUBLIC_URL" => config.server.public_url = value.clone(),
                "HUSK_BASE_PATH" => config.server.base_path = value.clone(),
                "HUSK_STORAGE_ROOT" => config.storage.root = Utf8PathBuf::from(value),
                "HUSK_METADATA_TTL_MINUTES" => {
                    config.proxy.metadata_ttl_minutes =
                        value.parse().map_err(|e| HuskError::ConfigValidation {
                            field: key.clone(),
                            reason: format!("Invalid number '{}': {}", value, e),
                        })?;
                },
                _ => {
                    // Unknown environment variable, ignore
                },
            }
        }

        Ok(())
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(config: &mut HuskToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "storage" => config.storage.root = Utf8PathBuf::from(value),
                "upstream" => config.proxy.upstream = value.clone(),
                "public_url" => config.server.public_url = value.clone(),
                _ => {
                    // Unknown CLI override, ignore
                },
            }
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with("HUSK_"))
            .collect()
    }
}

/// Deep-merge `overlay` into `base`; overlay wins on scalar conflicts
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                },
            },
            other => {
                base.insert(key, other);
            },
        }
    }
}

async fn read_table(path: &Utf8Path) -> ConfigResult<toml::Table> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HuskError::io(format!("Failed to read {}", path), e))?;

    // Full parse first for located syntax errors and per-file validation
    parse_husk_toml(&content).map_err(|e| match e {
        HuskError::TomlParse { message, line, column } => HuskError::TomlParse {
            message: format!("in file {}: {}", path, message),
            line,
            column,
        },
        other => other,
    })?;

    content.parse::<toml::Table>().map_err(|e| HuskError::TomlParse {
        message: format!("in file {}: {}", path, e.message()),
        line: 0,
        column: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table(text: &str) -> toml::Table {
        text.parse().unwrap()
    }

    #[test]
    fn test_defaults_when_no_layers() {
        let config = ConfigLayering::new().merge().unwrap();
        assert_eq!(config, HuskToml::default());
    }

    #[test]
    fn test_project_overrides_global_field_by_field() {
        let global = table("[proxy]\nupstream = \"https://mirror.example.com\"\nmetadata_ttl_minutes = 60\n");
        let project = table("[proxy]\nmetadata_ttl_minutes = 5\n");

        let config = ConfigLayering::new()
            .with_global(global)
            .with_project(project)
            .merge()
            .unwrap();

        assert_eq!(config.proxy.upstream, "https://mirror.example.com");
        assert_eq!(config.proxy.metadata_ttl_minutes, 5);
    }

    #[test]
    fn test_env_and_cli_overrides() {
        let mut env = HashMap::new();
        env.insert("HUSK_UPSTREAM".to_string(), "https://env.example.com".to_string());
        env.insert("HUSK_METADATA_TTL_MINUTES".to_string(), "15".to_string());
        let mut cli = HashMap::new();
        cli.insert("upstream".to_string(), "https://cli.example.com".to_string());

        let config = ConfigLayering::new().with_env(env).with_cli(cli).merge().unwrap();
        assert_eq!(config.proxy.upstream, "https://cli.example.com");
        assert_eq!(config.proxy.metadata_ttl_minutes, 15);
    }

    #[test]
    fn test_invalid_env_number() {
        let mut env = HashMap::new();
        env.insert("HUSK_METADATA_TTL_MINUTES".to_string(), "soon".to_string());
        let err = ConfigLayering::new().with_env(env).merge().unwrap_err();
        assert!(matches!(err, HuskError::ConfigValidation { .. }));
    }

    #[tokio::test]
    async fn test_resolve_config_path_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let nested = root.join("a").join("b");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(root.join(CONFIG_FILE), "[storage]\nroot = \"data\"\n")
            .await
            .unwrap();

        let loader = ConfigLoader::new(nested);
        assert_eq!(loader.resolve_config_path(CONFIG_FILE), Some(root.join(CONFIG_FILE)));

        let (config, sources) = loader.load(HashMap::new()).await.unwrap();
        assert_eq!(config.storage.root, Utf8PathBuf::from("data"));
        assert!(sources.contains(&ConfigSource::Project(root.join(CONFIG_FILE))));
    }
}
