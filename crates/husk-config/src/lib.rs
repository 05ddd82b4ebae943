//! Configuration parsing for the Husk registry
//!
//! This crate handles parsing and validation of `husk.toml`, layering the
//! global file, the project file and `HUSK_*` environment overrides into the
//! settings consumed by the hosted registry and the proxy cache.

pub mod merge;
pub mod toml;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use crate::toml::{BreakerSection, HuskToml, ProxySection, ServerSection, StorageSection};

use husk_core::error::HuskError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, HuskError>;
