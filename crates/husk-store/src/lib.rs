//! Storage and archive handling for Husk
//!
//! This crate provides the key/value storage collaborator used by both the
//! hosted registry and the proxy cache, together with the tarball codec that
//! decodes uploaded archives and pulls single entries out of them.

pub mod storage;
pub mod tarball;

// Re-export main types
pub use storage::{FsStorage, MemoryStorage, SharedStorage, Storage};
pub use tarball::{
    build_tarball, create_tarball, decode, extract_file, extract_package_json, TarballPayload,
};

use husk_core::error::HuskError;

/// Result type for storage and codec operations
pub type StoreResult<T> = Result<T, HuskError>;
