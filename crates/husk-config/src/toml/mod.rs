//! husk.toml configuration parsing and serialization

use std::time::Duration;

use camino::Utf8PathBuf;
use husk_core::error::HuskError;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ConfigResult;

/// Complete husk.toml configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HuskToml {
    /// Public address clients download from
    pub server: ServerSection,

    /// Storage backend settings
    pub storage: StorageSection,

    /// Upstream registry and proxy cache settings
    pub proxy: ProxySection,
}

/// Public address section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Scheme and host, e.g. `http://localhost:4873`
    pub public_url: String,

    /// Path prefix the registry is mounted under
    pub base_path: String,
}

/// Storage section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Root directory of the filesystem store
    pub root: Utf8PathBuf,
}

/// Upstream registry section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxySection {
    /// Base URL of the mirrored registry
    pub upstream: String,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Whole-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// How long cached metadata stays fresh
    pub metadata_ttl_minutes: u64,

    /// Bearer token sent upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Circuit breaker policy
    pub breaker: BreakerSection,
}

/// Circuit breaker policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSection {
    /// Failure ratio that trips the breaker, in (0, 1]
    pub failure_rate_threshold: f64,

    /// Number of most recent calls the ratio is computed over
    pub window_size: usize,

    /// Calls needed in the window before the ratio is evaluated
    pub minimum_calls: usize,

    /// Time spent open before a trial call is let through
    pub reset_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:4873".to_string(),
            base_path: String::new(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("./storage"),
        }
    }
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            upstream: "https://registry.npmjs.org".to_string(),
            connect_timeout_ms: 2000,
            request_timeout_ms: 5000,
            metadata_ttl_minutes: 1440,
            token: None,
            breaker: BreakerSection::default(),
        }
    }
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            window_size: 10,
            minimum_calls: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

impl ServerSection {
    /// `<public_url><base_path>` without a trailing slash
    pub fn public_base(&self) -> String {
        let host = self.public_url.trim_end_matches('/');
        let path = self.base_path.trim_matches('/');
        if path.is_empty() {
            host.to_string()
        } else {
            format!("{}/{}", host, path)
        }
    }
}

impl ProxySection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_minutes.saturating_mul(60))
    }
}

impl BreakerSection {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Parse TOML string to HuskToml configuration
pub fn parse_husk_toml(content: &str) -> ConfigResult<HuskToml> {
    // First try with toml_edit for better error reporting
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| toml_error(content, e.message(), e.span()))?;

    // Then parse with serde for type safety
    let config: HuskToml =
        toml::from_str(content).map_err(|e| toml_error(content, e.message(), e.span()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize HuskToml to TOML string
pub fn serialize_husk_toml(config: &HuskToml) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| HuskError::TomlParse {
        message: format!("TOML serialization error: {}", e),
        line: 0,
        column: 0,
    })
}

/// Validate configuration values
pub fn validate_config(config: &HuskToml) -> ConfigResult<()> {
    validate_url("server.public_url", &config.server.public_url)?;
    validate_url("proxy.upstream", &config.proxy.upstream)?;

    if config.storage.root.as_str().is_empty() {
        return Err(invalid("storage.root", "must not be empty"));
    }

    let proxy = &config.proxy;
    if proxy.connect_timeout_ms == 0 {
        return Err(invalid("proxy.connect_timeout_ms", "must be greater than zero"));
    }
    if proxy.request_timeout_ms == 0 {
        return Err(invalid("proxy.request_timeout_ms", "must be greater than zero"));
    }
    if proxy.metadata_ttl_minutes == 0 {
        return Err(invalid("proxy.metadata_ttl_minutes", "must be greater than zero"));
    }

    let breaker = &proxy.breaker;
    if !(breaker.failure_rate_threshold > 0.0 && breaker.failure_rate_threshold <= 1.0) {
        return Err(invalid(
            "proxy.breaker.failure_rate_threshold",
            "must be in the range (0, 1]",
        ));
    }
    if breaker.window_size == 0 {
        return Err(invalid("proxy.breaker.window_size", "must be greater than zero"));
    }
    if breaker.minimum_calls == 0 || breaker.minimum_calls > breaker.window_size {
        return Err(invalid(
            "proxy.breaker.minimum_calls",
            "must be between 1 and window_size",
        ));
    }

    Ok(())
}

/// Load and parse husk.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<HuskToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HuskError::io(format!("Failed to read {}", path), e))?;

    parse_husk_toml(&content).map_err(|e| match e {
        HuskError::TomlParse { message, line, column } => HuskError::TomlParse {
            message: format!("in file {}: {}", path, message),
            line,
            column,
        },
        HuskError::ConfigValidation { field, reason } => HuskError::ConfigValidation {
            field,
            reason: format!("{} (in file {})", reason, path),
        },
        other => other,
    })
}

fn validate_url(field: &str, value: &str) -> ConfigResult<()> {
    let url = Url::parse(value).map_err(|e| invalid(field, &format!("'{}' is not a URL: {}", value, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(field, &format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> HuskError {
    HuskError::ConfigValidation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Convert a byte span into 1-based line and column numbers
fn toml_error(content: &str, message: &str, span: Option<std::ops::Range<usize>>) -> HuskError {
    let (line, column) = match span {
        Some(span) => {
            let offset = span.start.min(content.len());
            let before = &content[..offset];
            let line = before.matches('\n').count() + 1;
            let column = offset - before.rfind('\n').map_or(0, |idx| idx + 1) + 1;
            (line, column)
        },
        None => (0, 0),
    };

    HuskError::TomlParse {
        message: message.trim().to_string(),
        line,
        column,
    }
}
