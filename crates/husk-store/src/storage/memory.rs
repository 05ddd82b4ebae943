//! In-memory storage backend

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use husk_core::error::HuskError;
use husk_core::utils::is_safe_key;

use super::Storage;
use crate::StoreResult;

/// Storage kept in a concurrent map, used by tests and embedders
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Bytes>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_key(key: &str) -> StoreResult<()> {
    if is_safe_key(key) {
        Ok(())
    } else {
        Err(HuskError::bad_request(format!("invalid storage key '{}'", key)))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        check_key(key)?;
        Ok(self.entries.contains_key(key))
    }

    async fn value(&self, key: &str) -> StoreResult<Bytes> {
        check_key(key)?;
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HuskError::not_found(format!("key '{}'", key)))
    }

    async fn save(&self, key: &str, content: Bytes) -> StoreResult<()> {
        check_key(key)?;
        self.entries.insert(key.to_string(), content);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        check_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
