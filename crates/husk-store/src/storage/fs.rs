//! Filesystem storage backend
//!
//! Each key maps to a file below the root directory. Writes go to a
//! temporary sibling first and are renamed into place, so a reader never
//! observes a partially written value.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use husk_core::error::HuskError;
use husk_core::utils::is_safe_key;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use super::Storage;
use crate::StoreResult;

const TEMP_MARKER: &str = ".husk-tmp-";

/// Storage rooted at a directory on disk
#[derive(Debug)]
pub struct FsStorage {
    root: Utf8PathBuf,
    temp_counter: AtomicU64,
}

impl FsStorage {
    /// Open (and create if needed) a storage root
    pub async fn open<P: AsRef<Utf8Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| HuskError::io(format!("Failed to create storage root {}", root), e))?;

        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Root directory of this storage
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn key_to_path(&self, key: &str) -> StoreResult<Utf8PathBuf> {
        if !is_safe_key(key) {
            return Err(HuskError::bad_request(format!("invalid storage key '{}'", key)));
        }
        Ok(self.root.join(key))
    }

    fn temp_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let file_name = path.file_name().unwrap_or("value");
        path.with_file_name(format!(".{}{}{}-{}", file_name, TEMP_MARKER, std::process::id(), n))
    }

    /// Remove now-empty directories between `path` and the root
    async fn prune_empty_parents(&self, path: &Utf8Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root.as_path() || !dir.starts_with(&self.root) {
                break;
            }
            // Fails when the directory still has entries, which ends the walk
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HuskError::io(format!("Failed to stat {}", path), e)),
        }
    }

    async fn value(&self, key: &str) -> StoreResult<Bytes> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(HuskError::not_found(format!("key '{}'", key)))
            },
            Err(e) => Err(HuskError::io(format!("Failed to read {}", path), e)),
        }
    }

    async fn save(&self, key: &str, content: Bytes) -> StoreResult<()> {
        let path = self.key_to_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HuskError::io(format!("Failed to create {}", parent), e))?;
        }

        let temp = self.temp_path(&path);
        if let Err(e) = fs::write(&temp, &content).await {
            let _ = fs::remove_file(&temp).await;
            return Err(HuskError::io(format!("Failed to write {}", temp), e));
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(HuskError::io(format!("Failed to move {} into place", path), e));
        }

        debug!(key, bytes = content.len(), "stored value");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(&path).await;
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HuskError::io(format!("Failed to delete {}", path), e)),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        // Walk the deepest directory the prefix names, then filter by the full prefix.
        let walk_from = match prefix.rfind('/') {
            Some(idx) if is_safe_key(&prefix[..idx]) => self.root.join(&prefix[..idx]),
            Some(_) => return Err(HuskError::bad_request(format!("invalid storage prefix '{}'", prefix))),
            None => self.root.clone(),
        };
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let keys = tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            if !walk_from.exists() {
                return keys;
            }
            for entry in WalkDir::new(&walk_from).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(path) = Utf8Path::from_path(entry.path()) else {
                    continue;
                };
                if path.file_name().map_or(false, |name| name.contains(TEMP_MARKER)) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            keys
        })
        .await
        .map_err(|e| HuskError::Storage {
            key: "<list>".to_string(),
            message: format!("listing task failed: {}", e),
        })?;

        Ok(keys)
    }
}
