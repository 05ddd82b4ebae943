//! Core data types for Husk.
//!
//! This module contains the package metadata document and the version
//! ordering used by the merge engine.

pub mod metadata;
pub mod version;

// Re-export main types
pub use metadata::{MetadataDocument, Patch};
pub use version::{compare_versions, max_version, sort_descending, VersionError, VersionKey};
