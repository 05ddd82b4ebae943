//! # husk-core
//!
//! Core types and utilities shared across all Husk crates.
//!
//! This crate provides:
//! - `MetadataDocument`, the consolidated per-package `meta.json`, with
//!   patch-style functional updates
//! - Numeric-component version ordering used when recomputing `latest`
//! - `HuskError` enum for unified error handling
//! - The `Clock` capability and storage key helpers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (MetadataDocument, Patch, version ordering)
//! - `error`: Error types and result aliases
//! - `utils`: Clock and storage path helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{HuskError, HuskResult};
pub use types::{MetadataDocument, Patch, VersionKey};
pub use utils::clock::{Clock, ManualClock, SharedClock, SystemClock};
