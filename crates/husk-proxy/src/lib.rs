//! Read-through caching proxy for an upstream npm registry
//!
//! This crate fetches package metadata and tarballs from the upstream
//! registry, guards the upstream with a circuit breaker, and keeps a local
//! copy in storage so installs keep working while the upstream is slow or
//! down.

pub mod breaker;
pub mod cache;
pub mod client;
pub mod transform;

// Re-export main types
pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use cache::{CachedAsset, CachedPackage, ProxyCache};
pub use client::{FetcherConfig, HttpFetcher, RemoteContent, RemoteFetcher, SharedFetcher};
pub use transform::{ContentTransform, TransformTarget};

use husk_core::error::HuskError;

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, HuskError>;

#[cfg(test)]
pub(crate) mod testing;
