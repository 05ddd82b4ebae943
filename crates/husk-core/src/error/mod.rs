//! Error types and result aliases for Husk operations.
//!
//! Provides a unified error type covering every failure the registry core can
//! surface, plus the mapping to HTTP-equivalent statuses that the external
//! routing layer applies at the request boundary.

use thiserror::Error;

/// Unified error type for all Husk operations
#[derive(Error, Debug)]
pub enum HuskError {
    // Lookup errors
    #[error("{what} not found")]
    NotFound { what: String },

    // Request errors
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Unsupported version format '{version}': only dot-separated numeric components are ordered")]
    UnsupportedVersion { version: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    // Archive errors
    #[error("Codec error: {message}")]
    Codec {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Upstream errors
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Storage errors
    #[error("Storage error on '{key}': {message}")]
    Storage { key: String, message: String },

    // Config errors
    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Failed to parse husk.toml: {message} at line {line}, column {column}")]
    TomlParse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Failed to parse JSON: {message}")]
    JsonParse { message: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Husk operations
pub type HuskResult<T> = Result<T, HuskError>;

impl HuskError {
    /// Create a not-found error for a package, asset or archive entry
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a bad-request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a codec error from any error type
    pub fn codec<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Codec {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an upstream error from any error type
    pub fn upstream<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// HTTP-equivalent status the routing layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            HuskError::NotFound { .. } => 404,
            HuskError::BadRequest { .. }
            | HuskError::MissingField { .. }
            | HuskError::UnsupportedVersion { .. }
            | HuskError::Codec { .. }
            | HuskError::JsonParse { .. } => 400,
            HuskError::Conflict { .. } => 409,
            HuskError::Upstream { .. } => 502,
            HuskError::Storage { .. }
            | HuskError::ConfigValidation { .. }
            | HuskError::TomlParse { .. }
            | HuskError::Io { .. } => 500,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HuskError::Upstream { .. } | HuskError::Io { .. } | HuskError::Storage { .. }
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            HuskError::NotFound { .. } => Some("Check the package name spelling and the registry it was published to"),
            HuskError::Conflict { .. } => {
                Some("Fetch the latest metadata and remove exactly one version per unpublish request")
            },
            HuskError::Codec { .. } => Some("Re-pack the tarball with `npm pack` and publish again"),
            HuskError::Upstream { .. } => Some("Check the upstream registry URL and your network connection"),
            HuskError::TomlParse { .. } | HuskError::ConfigValidation { .. } => {
                Some("Fix husk.toml or the HUSK_* environment overrides")
            },
            _ => None,
        }
    }
}

impl From<serde_json::Error> for HuskError {
    fn from(source: serde_json::Error) -> Self {
        Self::JsonParse {
            message: source.to_string(),
        }
    }
}
