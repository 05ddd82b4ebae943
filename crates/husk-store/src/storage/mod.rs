//! Key/value byte storage
//!
//! The registry core only ever talks to storage through the [`Storage`]
//! trait. Keys are `/`-separated paths relative to the storage root.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::StoreResult;

pub mod fs;
pub mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

/// Storage collaborator shared by the hosted registry and the proxy cache
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether a value is stored under `key`
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Stored bytes, `NotFound` when the key is absent
    async fn value(&self, key: &str) -> StoreResult<Bytes>;

    /// Store `content` under `key`, replacing any previous value
    async fn save(&self, key: &str, content: Bytes) -> StoreResult<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// All keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Storage handle shared between components
pub type SharedStorage = Arc<dyn Storage>;
