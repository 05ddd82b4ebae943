//! Hosted registry operations
//!
//! [`HostedRegistry`] is what the routing layer calls once a request has been
//! matched and authorized. Each method corresponds to one route of the npm
//! publish/install protocol.

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{debug, info};

use husk_core::error::HuskError;
use husk_core::types::metadata::{DIST, LATEST, TARBALL, VERSIONS};
use husk_core::utils::{is_safe_key, package_prefix, tarball_key, SharedClock};
use husk_core::MetadataDocument;
use husk_store::SharedStorage;

use crate::api::{PublishEnvelope, RefererHint};
use crate::merge::MetadataMergeEngine;
use crate::publish::{load_document, save_document, PublishPipeline};
use crate::RegistryResult;

/// Path marker npm appends to DELETE requests
const REVISION_MARKER: &str = "/-rev/";

/// Registry for packages published to this server
#[derive(Clone)]
pub struct HostedRegistry {
    storage: SharedStorage,
    pipeline: PublishPipeline,
    public_base: String,
}

impl HostedRegistry {
    /// `public_base` is `<public_url><base_path>` without a trailing slash
    pub fn new(storage: SharedStorage, clock: SharedClock, public_base: impl Into<String>) -> Self {
        let pipeline = PublishPipeline::new(storage.clone(), MetadataMergeEngine::new(clock));
        Self {
            storage,
            pipeline,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn pipeline(&self) -> &PublishPipeline {
        &self.pipeline
    }

    fn engine(&self) -> &MetadataMergeEngine {
        self.pipeline.engine()
    }

    /// `PUT /<pkg>`, dispatched on the npm `referer` header
    pub async fn put_package(
        &self,
        package: &str,
        referer: Option<&str>,
        body: &[u8],
    ) -> RegistryResult<MetadataDocument> {
        let package = package_name(package)?;
        let envelope = PublishEnvelope::from_slice(body)?;
        if envelope.name()? != package {
            return Err(HuskError::bad_request(format!(
                "body names '{}' but the request is for '{}'",
                envelope.name()?,
                package
            )));
        }

        match RefererHint::from_header(referer) {
            RefererHint::Publish => self.pipeline.publish_envelope(&envelope).await,
            RefererHint::Deprecate => self.deprecate(&package, &envelope).await,
            RefererHint::Unpublish => self.unpublish_one(&package, &envelope).await.map(|(doc, _)| doc),
        }
    }

    /// `PUT *.tgz`
    pub async fn put_tarball(&self, body: Bytes) -> RegistryResult<MetadataDocument> {
        self.pipeline.publish_tarball(body).await
    }

    pub async fn deprecate(&self, package: &str, envelope: &PublishEnvelope) -> RegistryResult<MetadataDocument> {
        let current = self.require_document(package).await?;
        let updated = self.engine().apply_deprecate(&current, &envelope.as_value())?;
        save_document(self.storage.as_ref(), package, &updated).await?;

        info!(package = %package, "deprecated");
        Ok(updated)
    }

    /// Remove the one version the envelope no longer lists, and its tarball
    pub async fn unpublish_one(
        &self,
        package: &str,
        envelope: &PublishEnvelope,
    ) -> RegistryResult<(MetadataDocument, String)> {
        let current = self.require_document(package).await?;
        let (updated, removed) = self.engine().apply_unpublish_one(&current, &envelope.as_value())?;

        let asset = current
            .get(&[VERSIONS, removed.as_str(), DIST, TARBALL])
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| tarball_key(package, &removed));

        save_document(self.storage.as_ref(), package, &updated).await?;
        if is_safe_key(&asset) {
            self.storage.delete(&asset).await?;
        }

        info!(package = %package, version = %removed, "unpublished version");
        Ok((updated, removed))
    }

    /// `GET /-/package/<pkg>/dist-tags`
    pub async fn dist_tags(&self, package: &str) -> RegistryResult<Map<String, Value>> {
        let package = package_name(package)?;
        let doc = self.require_document(&package).await?;
        Ok(doc.dist_tags().cloned().unwrap_or_default())
    }

    /// `PUT /-/package/<pkg>/dist-tags/<tag>`; the body is the version,
    /// either bare or as a JSON string
    pub async fn put_dist_tag(&self, package: &str, tag: &str, body: &[u8]) -> RegistryResult<Map<String, Value>> {
        let package = package_name(package)?;
        let version = match serde_json::from_slice::<String>(body) {
            Ok(version) => version,
            Err(_) => String::from_utf8_lossy(body).trim().to_string(),
        };
        if version.is_empty() {
            return Err(HuskError::bad_request("dist-tag body must name a version"));
        }

        let current = self.require_document(&package).await?;
        let updated = self.engine().apply_dist_tag(&current, tag, &version)?;
        save_document(self.storage.as_ref(), &package, &updated).await?;

        info!(package = %package, tag, version = %version, "dist-tag set");
        Ok(updated.dist_tags().cloned().unwrap_or_default())
    }

    /// `DELETE /-/package/<pkg>/dist-tags/<tag>`
    pub async fn delete_dist_tag(&self, package: &str, tag: &str) -> RegistryResult<Map<String, Value>> {
        if tag == LATEST {
            return Err(HuskError::bad_request("the latest dist-tag cannot be removed"));
        }
        let package = package_name(package)?;
        let current = self.require_document(&package).await?;
        let updated = self.engine().remove_dist_tag(&current, tag)?;
        save_document(self.storage.as_ref(), &package, &updated).await?;

        info!(package = %package, tag, "dist-tag removed");
        Ok(updated.dist_tags().cloned().unwrap_or_default())
    }

    /// Delete every stored key of `package`; returns how many were removed
    pub async fn unpublish_all(&self, package: &str) -> RegistryResult<usize> {
        let package = package_name(package)?;
        let keys = self.storage.list(&package_prefix(&package)).await?;
        if keys.is_empty() {
            return Err(HuskError::not_found(format!("package '{}'", package)));
        }

        for key in &keys {
            self.storage.delete(key).await?;
        }

        info!(package = %package, keys = keys.len(), "unpublished package");
        Ok(keys.len())
    }

    /// `DELETE <path>[/-rev/<rev>]`: a tarball path removes that asset, a
    /// package path removes the whole package
    pub async fn delete(&self, path: &str) -> RegistryResult<usize> {
        let path = match path.find(REVISION_MARKER) {
            Some(idx) => &path[..idx],
            None => path,
        };
        let path = decode_name(path);

        if path.contains("/-/") {
            if !is_safe_key(&path) {
                return Err(HuskError::bad_request(format!("invalid asset path '{}'", path)));
            }
            if !self.storage.exists(&path).await? {
                return Err(HuskError::not_found(format!("asset '{}'", path)));
            }
            self.storage.delete(&path).await?;
            debug!(asset = %path, "deleted tarball");
            return Ok(1);
        }

        self.unpublish_all(&path).await
    }

    /// `GET /<pkg>`: metadata with tarball paths turned into download URLs
    pub async fn package_metadata(&self, package: &str) -> RegistryResult<Value> {
        let package = package_name(package)?;
        let doc = self.require_document(&package).await?;
        Ok(doc
            .map_tarballs(|path| format!("{}/{}", self.public_base, path))
            .into_value())
    }

    /// `GET /<pkg>/-/<file>.tgz`
    pub async fn asset(&self, path: &str) -> RegistryResult<Bytes> {
        let path = decode_name(path);
        if !is_safe_key(&path) {
            return Err(HuskError::bad_request(format!("invalid asset path '{}'", path)));
        }
        self.storage.value(&path).await
    }

    /// Stored document, or `NotFound` for unknown packages
    pub async fn document(&self, package: &str) -> RegistryResult<MetadataDocument> {
        let package = package_name(package)?;
        self.require_document(&package).await
    }

    async fn require_document(&self, package: &str) -> RegistryResult<MetadataDocument> {
        load_document(self.storage.as_ref(), package)
            .await?
            .ok_or_else(|| HuskError::not_found(format!("package '{}'", package)))
    }
}

/// Undo the escaping npm applies to scoped names in URLs
fn decode_name(raw: &str) -> String {
    raw.trim_matches('/')
        .replace("%40", "@")
        .replace("%2f", "/")
        .replace("%2F", "/")
}

/// Validate a package name taken from a request path
fn package_name(raw: &str) -> RegistryResult<String> {
    let name = decode_name(raw);
    let expected_segments = if name.starts_with('@') { 2 } else { 1 };
    let valid = is_safe_key(&name) && name.split('/').count() == expected_segments;

    if !valid {
        return Err(HuskError::bad_request(format!("invalid package name '{}'", raw)));
    }
    Ok(name)
}

#[cfg(test)]
mod tests;
