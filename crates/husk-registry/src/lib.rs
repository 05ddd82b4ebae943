//! Hosted npm registry core for Husk
//!
//! This crate implements the write side of the registry protocol: resolving
//! uploaded tarball URLs to package-relative paths, merging publish,
//! dist-tag, deprecate and unpublish requests into the consolidated
//! `meta.json`, and the publish pipeline that stores tarballs alongside it.

pub mod api;
pub mod merge;
pub mod publish;
pub mod resolver;
pub mod service;

// Re-export main types
pub use api::{Attachment, PackageManifest, PublishEnvelope, RefererHint};
pub use merge::MetadataMergeEngine;
pub use publish::PublishPipeline;
pub use resolver::{PathShape, ResolvedPath, VersionPathResolver};
pub use service::HostedRegistry;

use husk_core::error::HuskError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, HuskError>;
