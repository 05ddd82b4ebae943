//! Publish pipeline
//!
//! Two upload shapes reach the same merge step:
//! - envelope publish: the JSON document `npm publish` sends, with base64
//!   tarballs under `_attachments`
//! - direct publish: a raw `.tgz` body whose `package.json` names the package
//!
//! The merged document is computed before anything is written, so a rejected
//! publish leaves storage untouched. Tarballs are then written before
//! `meta.json`, so metadata never points at an asset that is not stored yet.

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use sha1::Sha1;
use sha2::{Digest, Sha512};
use tracing::{debug, info};

use husk_core::error::HuskError;
use husk_core::types::metadata::{DIST, ID, README};
use husk_core::utils::{is_safe_key, meta_key, tarball_key};
use husk_core::MetadataDocument;
use husk_store::{decode, extract_package_json, SharedStorage, Storage, TarballPayload};

use crate::api::{PackageManifest, PublishEnvelope};
use crate::merge::MetadataMergeEngine;
use crate::RegistryResult;

/// Orchestrates tarball storage and metadata merging for a publish
#[derive(Clone)]
pub struct PublishPipeline {
    storage: SharedStorage,
    engine: MetadataMergeEngine,
}

impl PublishPipeline {
    pub fn new(storage: SharedStorage, engine: MetadataMergeEngine) -> Self {
        Self { storage, engine }
    }

    pub fn engine(&self) -> &MetadataMergeEngine {
        &self.engine
    }

    /// Decode every attachment, then merge the envelope into `meta.json`
    pub async fn publish_envelope(&self, envelope: &PublishEnvelope) -> RegistryResult<MetadataDocument> {
        let package = envelope.name()?.to_string();
        envelope.versions()?;

        let mut tarballs = Vec::new();
        for (name, attachment) in envelope.attachments()? {
            let key = attachment_key(&package, &name)?;
            let bytes = decode(&TarballPayload::base64(attachment.data))?;
            if let Some(length) = attachment.length {
                if length != bytes.len() as u64 {
                    return Err(HuskError::bad_request(format!(
                        "attachment '{}' declares {} bytes but decodes to {}",
                        name,
                        length,
                        bytes.len()
                    )));
                }
            }

            tarballs.push((key, Bytes::from(bytes)));
        }

        self.commit(&package, envelope, tarballs).await
    }

    /// Publish a tarball carried over a text channel
    pub async fn publish_payload(&self, payload: &TarballPayload) -> RegistryResult<MetadataDocument> {
        let bytes = decode(payload)?;
        self.publish_tarball(Bytes::from(bytes)).await
    }

    /// Publish a raw `.tgz` body
    pub async fn publish_tarball(&self, tarball: Bytes) -> RegistryResult<MetadataDocument> {
        let manifest = extract_package_json(&tarball)?;
        let PackageManifest { name, version } = PackageManifest::from_value(&manifest)?;

        let key = tarball_key(&name, &version);
        if !is_safe_key(&key) {
            return Err(HuskError::bad_request(format!("invalid package name '{}'", name)));
        }
        let envelope = direct_envelope(&name, &version, &key, manifest, &tarball)?;

        self.commit(&name, &envelope, vec![(key, tarball)]).await
    }

    /// Merge, then write `tarballs` and the merged `meta.json`
    async fn commit(
        &self,
        package: &str,
        envelope: &PublishEnvelope,
        tarballs: Vec<(String, Bytes)>,
    ) -> RegistryResult<MetadataDocument> {
        let uploaded = envelope.as_value();
        let current = match load_document(self.storage.as_ref(), package).await? {
            Some(doc) => doc,
            None => self.engine.create_skeleton(&uploaded)?,
        };
        let updated = self.engine.apply_publish(&current, &uploaded)?;

        for (key, bytes) in tarballs {
            debug!(package = %package, key = %key, bytes = bytes.len(), "storing tarball");
            self.storage.save(&key, bytes).await?;
        }
        save_document(self.storage.as_ref(), package, &updated).await?;

        info!(package = %package, versions = ?envelope.versions()?.keys().collect::<Vec<_>>(), "published");
        Ok(updated)
    }
}

/// Envelope equivalent to what `npm publish` would have sent for this tarball
fn direct_envelope(
    name: &str,
    version: &str,
    key: &str,
    manifest: Value,
    tarball: &[u8],
) -> RegistryResult<PublishEnvelope> {
    let readme = manifest
        .get(README)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut entry = match manifest {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    entry.insert(ID.to_string(), Value::String(format!("{}@{}", name, version)));
    entry.insert(
        DIST.to_string(),
        json!({
            "tarball": key,
            "shasum": hex::encode(Sha1::digest(tarball)),
            "integrity": format!("sha512-{}", general_purpose::STANDARD.encode(Sha512::digest(tarball))),
        }),
    );

    let mut versions = Map::new();
    versions.insert(version.to_string(), Value::Object(entry));

    PublishEnvelope::from_value(json!({
        "_id": name,
        "name": name,
        "readme": readme,
        "dist-tags": { "latest": version },
        "versions": Value::Object(versions),
    }))
}

/// `<pkg>/-/<attachment>`; attachment names may carry the scope
fn attachment_key(package: &str, attachment: &str) -> RegistryResult<String> {
    let key = format!("{}/-/{}", package, attachment);
    if !attachment.ends_with(".tgz") || !is_safe_key(&key) {
        return Err(HuskError::bad_request(format!("invalid attachment name '{}'", attachment)));
    }
    Ok(key)
}

/// Stored `meta.json`, `None` when the package was never published
pub(crate) async fn load_document(
    storage: &dyn Storage,
    package: &str,
) -> RegistryResult<Option<MetadataDocument>> {
    match storage.value(&meta_key(package)).await {
        Ok(bytes) => Ok(Some(MetadataDocument::from_slice(&bytes)?)),
        Err(HuskError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) async fn save_document(
    storage: &dyn Storage,
    package: &str,
    doc: &MetadataDocument,
) -> RegistryResult<()> {
    storage.save(&meta_key(package), Bytes::from(doc.to_vec()?)).await
}
