//! Read-through cache in front of the upstream registry
//!
//! Every cached value lives in storage next to a `<key>.meta` sidecar that
//! records when it was refreshed and the SHA-256 of the value. The sidecar is
//! written after the value, so an entry without a readable sidecar, or whose
//! value does not match the recorded digest, is treated as absent.
//!
//! Metadata documents go stale after the configured TTL and are refetched;
//! if the refetch fails (or the circuit is open) the stale copy is served.
//! Assets never change once published and are never refetched.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use husk_config::{ProxySection, ServerSection};
use husk_core::error::HuskError;
use husk_core::utils::{is_safe_key, meta_key, sidecar_key, SharedClock};
use husk_store::SharedStorage;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::client::{FetcherConfig, HttpFetcher, RemoteContent, SharedFetcher};
use crate::transform::ContentTransform;
use crate::ProxyResult;

/// Sidecar stored at `<key>.meta`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sidecar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
    last_refreshed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    /// Hex SHA-256 of the stored value
    digest: String,
}

/// A metadata document as served to a client
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPackage {
    pub name: String,
    /// Document with client-absolute tarball URLs
    pub body: Bytes,
    /// Upstream `Last-Modified` header
    pub last_modified: Option<String>,
    pub last_refreshed: DateTime<Utc>,
}

/// A cached tarball or other asset
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAsset {
    pub path: String,
    pub body: Bytes,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
}

/// Stored value plus its sidecar
struct Entry {
    body: Bytes,
    sidecar: Sidecar,
}

/// Read-through proxy cache
#[derive(Clone)]
pub struct ProxyCache {
    storage: SharedStorage,
    fetcher: SharedFetcher,
    clock: SharedClock,
    /// How long a metadata document stays fresh
    ttl: Duration,
    transform: ContentTransform,
}

impl ProxyCache {
    pub fn new(
        storage: SharedStorage,
        fetcher: SharedFetcher,
        clock: SharedClock,
        ttl: Duration,
        transform: ContentTransform,
    ) -> Self {
        Self {
            storage,
            fetcher,
            clock,
            ttl,
            transform,
        }
    }

    /// Cache over an [`HttpFetcher`] guarded by a [`CircuitBreaker`]
    pub fn from_config(
        proxy: &ProxySection,
        server: &ServerSection,
        storage: SharedStorage,
        clock: SharedClock,
    ) -> ProxyResult<Self> {
        let http = HttpFetcher::new(FetcherConfig::from(proxy))?;
        let breaker = CircuitBreaker::new(http, BreakerConfig::from(&proxy.breaker), clock.clone());
        let transform = ContentTransform::new(proxy.upstream.clone(), server.public_base());

        Ok(Self::new(
            storage,
            Arc::new(breaker),
            clock,
            proxy.metadata_ttl(),
            transform,
        ))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Metadata document of `name`, refreshed from upstream when stale
    pub async fn get_package(&self, name: &str) -> ProxyResult<CachedPackage> {
        let name = package_name(name)?;
        let key = meta_key(&name);
        let cached = self.read_entry(&key).await?;

        if let Some(entry) = &cached {
            if self.is_fresh(&entry.sidecar) {
                debug!(package = %name, "cache hit");
                return self.serve_package(&name, entry);
            }
            debug!(package = %name, "cache entry stale, refreshing");
        } else {
            debug!(package = %name, "cache miss");
        }

        match self.fetcher.load_package(&name).await {
            Ok(Some(remote)) => match self.store_package(&key, remote, cached.as_ref()).await {
                Ok(Some(entry)) => return self.serve_package(&name, &entry),
                Ok(None) => warn!(package = %name, "upstream sent an unusable document"),
                Err(e) => warn!(package = %name, error = %e, "cache write-back failed"),
            },
            Ok(None) => debug!(package = %name, "upstream has no such package"),
            Err(e) => warn!(package = %name, error = %e, "upstream fetch failed"),
        }

        match cached {
            Some(entry) => {
                warn!(
                    package = %name,
                    refreshed = %entry.sidecar.last_refreshed,
                    "serving stale metadata"
                );
                self.serve_package(&name, &entry)
            },
            None => Err(HuskError::not_found(format!("package '{}'", name))),
        }
    }

    /// Asset at the registry-relative `path`, fetched once and kept
    pub async fn get_asset(&self, path: &str) -> ProxyResult<CachedAsset> {
        let key = path.trim_start_matches('/');
        if !is_safe_key(key) {
            return Err(HuskError::bad_request(format!("invalid asset path '{}'", path)));
        }

        if let Some(entry) = self.read_entry(key).await? {
            debug!(asset = key, "cache hit");
            return Ok(asset(key, entry));
        }
        debug!(asset = key, "cache miss");

        match self.fetcher.load_asset(key).await {
            Ok(Some(remote)) => {
                let entry = self.entry(remote.body, remote.last_modified, remote.content_type);
                // The fetched bytes are good even if they could not be kept
                if let Err(e) = self.write_entry(key, &entry, None).await {
                    warn!(asset = key, error = %e, "cache write-back failed");
                }
                Ok(asset(key, entry))
            },
            Ok(None) => Err(HuskError::not_found(format!("asset '{}'", key))),
            Err(e) => {
                warn!(asset = key, error = %e, "upstream fetch failed");
                Err(HuskError::not_found(format!("asset '{}'", key)))
            },
        }
    }

    fn is_fresh(&self, sidecar: &Sidecar) -> bool {
        // A refresh time in the future means the clock went backwards
        match (self.clock.now() - sidecar.last_refreshed).to_std() {
            Ok(age) => age < self.ttl,
            Err(_) => false,
        }
    }

    fn serve_package(&self, name: &str, entry: &Entry) -> ProxyResult<CachedPackage> {
        Ok(CachedPackage {
            name: name.to_string(),
            body: self.transform.to_client(&entry.body)?,
            last_modified: entry.sidecar.last_modified.clone(),
            last_refreshed: entry.sidecar.last_refreshed,
        })
    }

    fn entry(&self, body: Bytes, last_modified: Option<String>, content_type: Option<String>) -> Entry {
        Entry {
            sidecar: Sidecar {
                last_modified,
                last_refreshed: self.clock.now(),
                content_type,
                digest: digest(&body),
            },
            body,
        }
    }

    /// Rewrite and persist an upstream document; `None` if it is not a
    /// metadata object
    async fn store_package(
        &self,
        key: &str,
        remote: RemoteContent,
        previous: Option<&Entry>,
    ) -> ProxyResult<Option<Entry>> {
        let body = match self.transform.to_cached(&remote.body) {
            Ok(body) => body,
            Err(e) => {
                debug!(key, error = %e, "rejecting upstream document");
                return Ok(None);
            },
        };

        let entry = self.entry(body, remote.last_modified, remote.content_type);
        self.write_entry(key, &entry, previous).await?;
        Ok(Some(entry))
    }

    async fn read_entry(&self, key: &str) -> ProxyResult<Option<Entry>> {
        let sidecar = match self.storage.value(&sidecar_key(key)).await {
            Ok(bytes) => bytes,
            Err(HuskError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let sidecar: Sidecar = match serde_json::from_slice(&sidecar) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                debug!(key, error = %e, "unreadable sidecar, treating entry as absent");
                return Ok(None);
            },
        };

        let body = match self.storage.value(key).await {
            Ok(body) => body,
            Err(HuskError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if digest(&body) != sidecar.digest {
            debug!(key, "value does not match its sidecar, treating entry as absent");
            return Ok(None);
        }
        Ok(Some(Entry { body, sidecar }))
    }

    /// Save the value, then its sidecar. If the sidecar cannot be saved the
    /// `previous` value is put back so the old entry stays readable.
    async fn write_entry(&self, key: &str, entry: &Entry, previous: Option<&Entry>) -> ProxyResult<()> {
        let sidecar = Bytes::from(serde_json::to_vec(&entry.sidecar)?);
        self.storage.save(key, entry.body.clone()).await?;

        if let Err(e) = self.storage.save(&sidecar_key(key), sidecar).await {
            if let Some(previous) = previous {
                if let Err(restore) = self.storage.save(key, previous.body.clone()).await {
                    warn!(key, error = %restore, "could not restore previous cache entry");
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProxyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCache")
            .field("ttl", &self.ttl)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

fn asset(key: &str, entry: Entry) -> CachedAsset {
    CachedAsset {
        path: key.to_string(),
        body: entry.body,
        last_modified: entry.sidecar.last_modified,
        content_type: entry.sidecar.content_type,
    }
}

fn digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Decode `@scope%2fname` and check the name maps to a package prefix
fn package_name(raw: &str) -> ProxyResult<String> {
    let name = raw.replace("%2f", "/").replace("%2F", "/").replace("%40", "@");
    let segments = if name.starts_with('@') { 2 } else { 1 };

    if name.split('/').count() != segments || !is_safe_key(&name) {
        return Err(HuskError::bad_request(format!("invalid package name '{}'", raw)));
    }
    Ok(name)
}
