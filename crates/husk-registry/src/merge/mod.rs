//! Metadata merge engine
//!
//! Every operation is a function of the current document and the request.
//! It builds the minimal list of field-level [`Patch`]es and applies them in
//! one step, so a failed operation never yields a half-updated document.
//!
//! Callers persist the returned document with a plain read-compute-write
//! cycle and no lease. Two concurrent writers to the same package race and
//! the last write wins.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use husk_core::error::HuskError;
use husk_core::types::max_version;
use husk_core::types::metadata::{
    ATTACHMENTS, CREATED, DEPRECATED, DIST, DIST_TAGS, ID, LATEST, MODIFIED, NAME, README, TARBALL,
    TIME, USERS, VERSIONS,
};
use husk_core::utils::{format_timestamp, SharedClock};
use husk_core::{MetadataDocument, Patch};

use crate::resolver::VersionPathResolver;
use crate::RegistryResult;

/// Computes metadata updates for publish, dist-tag, deprecate and unpublish
#[derive(Debug, Clone)]
pub struct MetadataMergeEngine {
    clock: SharedClock,
}

impl MetadataMergeEngine {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    fn now(&self) -> Value {
        Value::String(format_timestamp(self.clock.now()))
    }

    /// Fresh document for a package that has no `meta.json` yet
    pub fn create_skeleton(&self, uploaded: &Value) -> RegistryResult<MetadataDocument> {
        let mut root = Map::new();
        for field in [NAME, ID, README] {
            let value = uploaded.get(field).ok_or_else(|| HuskError::MissingField {
                field: field.to_string(),
            })?;
            root.insert(field.to_string(), value.clone());
        }

        let mut time = Map::new();
        time.insert(CREATED.to_string(), self.now());
        root.insert(TIME.to_string(), Value::Object(time));
        root.insert(USERS.to_string(), Value::Object(Map::new()));
        root.insert(VERSIONS.to_string(), Value::Object(Map::new()));
        root.insert(ATTACHMENTS.to_string(), Value::Object(Map::new()));

        MetadataDocument::from_value(Value::Object(root))
    }

    /// Merge the versions and dist-tags of a publish envelope
    pub fn apply_publish(&self, doc: &MetadataDocument, uploaded: &Value) -> RegistryResult<MetadataDocument> {
        check_same_package(doc, uploaded)?;
        let versions = uploaded_versions(uploaded)?;
        let now = self.now();
        let mut patches = Vec::new();

        if let Some(tags) = uploaded.get(DIST_TAGS) {
            let tags = tags
                .as_object()
                .ok_or_else(|| HuskError::bad_request("dist-tags must be an object"))?;
            for (tag, version) in tags {
                patches.push(Patch::set(&[DIST_TAGS, tag.as_str()], version.clone()));
            }
        }

        for (version, manifest) in versions {
            let manifest = with_relative_tarball(version, manifest)?;
            patches.push(Patch::set(&[VERSIONS, version.as_str()], manifest));
            patches.push(Patch::set(&[TIME, version.as_str()], now.clone()));
        }
        patches.push(Patch::set(&[TIME, MODIFIED], now));

        debug!(versions = versions.len(), patches = patches.len(), "merging publish");
        doc.apply(&patches)
    }

    /// Point `tag` at `version`
    pub fn apply_dist_tag(&self, doc: &MetadataDocument, tag: &str, version: &str) -> RegistryResult<MetadataDocument> {
        if tag.is_empty() {
            return Err(HuskError::bad_request("dist-tag name must not be empty"));
        }
        doc.apply(&[Patch::set(&[DIST_TAGS, tag], Value::String(version.to_string()))])
    }

    /// Drop `tag`; a missing tag is not an error
    pub fn remove_dist_tag(&self, doc: &MetadataDocument, tag: &str) -> RegistryResult<MetadataDocument> {
        doc.apply(&[Patch::remove(&[DIST_TAGS, tag])])
    }

    /// Copy `deprecated` messages for versions present on both sides
    pub fn apply_deprecate(&self, doc: &MetadataDocument, uploaded: &Value) -> RegistryResult<MetadataDocument> {
        check_same_package(doc, uploaded)?;
        let versions = uploaded_versions(uploaded)?;
        let stored = doc.version_keys();
        let mut patches = Vec::new();

        for (version, manifest) in versions {
            if !stored.contains(version) {
                continue;
            }
            match manifest.get(DEPRECATED) {
                None => {},
                Some(Value::String(message)) => {
                    patches.push(Patch::set(
                        &[VERSIONS, version.as_str(), DEPRECATED],
                        Value::String(message.clone()),
                    ));
                },
                Some(_) => {
                    return Err(HuskError::bad_request(format!(
                        "deprecated message of {} must be a string",
                        version
                    )))
                },
            }
        }

        debug!(deprecated = patches.len(), "merging deprecate");
        doc.apply(&patches)
    }

    /// Remove the single version missing from `uploaded`.
    ///
    /// Returns the new document and the removed version.
    pub fn apply_unpublish_one(
        &self,
        doc: &MetadataDocument,
        uploaded: &Value,
    ) -> RegistryResult<(MetadataDocument, String)> {
        check_same_package(doc, uploaded)?;
        let remaining: BTreeSet<String> = uploaded_versions(uploaded)?.keys().cloned().collect();
        let stored = doc.version_keys();

        let difference: Vec<&String> = stored.symmetric_difference(&remaining).collect();
        let removed = match difference.as_slice() {
            [only] if stored.contains(*only) => (*only).clone(),
            [only] => {
                return Err(HuskError::Conflict {
                    message: format!("version {} is not published", only),
                })
            },
            _ => {
                return Err(HuskError::Conflict {
                    message: format!(
                        "expected exactly one version difference, found {}",
                        difference.len()
                    ),
                })
            },
        };

        let mut patches = vec![
            Patch::remove(&[VERSIONS, removed.as_str()]),
            Patch::remove(&[TIME, removed.as_str()]),
            Patch::remove(&[DIST_TAGS, removed.as_str()]),
        ];
        if let Some(tags) = doc.dist_tags() {
            for (tag, target) in tags {
                if tag != LATEST && target.as_str() == Some(removed.as_str()) {
                    patches.push(Patch::remove(&[DIST_TAGS, tag.as_str()]));
                }
            }
        }

        match max_version(remaining.iter().map(String::as_str))? {
            Some(latest) => patches.push(Patch::set(&[DIST_TAGS, LATEST], Value::String(latest))),
            None => patches.push(Patch::remove(&[DIST_TAGS, LATEST])),
        }
        patches.push(Patch::set(&[TIME, MODIFIED], self.now()));

        debug!(version = %removed, "merging unpublish");
        Ok((doc.apply(&patches)?, removed))
    }
}

fn uploaded_versions(uploaded: &Value) -> RegistryResult<&Map<String, Value>> {
    uploaded
        .get(VERSIONS)
        .and_then(Value::as_object)
        .ok_or_else(|| HuskError::MissingField {
            field: VERSIONS.to_string(),
        })
}

fn check_same_package(doc: &MetadataDocument, uploaded: &Value) -> RegistryResult<()> {
    match (doc.name(), uploaded.get(NAME).and_then(Value::as_str)) {
        (Some(stored), Some(incoming)) if stored != incoming => Err(HuskError::bad_request(format!(
            "package name '{}' does not match '{}'",
            incoming, stored
        ))),
        _ => Ok(()),
    }
}

/// Copy of `manifest` whose `dist.tarball` is package-relative
fn with_relative_tarball(version: &str, manifest: &Value) -> RegistryResult<Value> {
    let mut manifest = manifest.clone();
    let dist = manifest
        .as_object_mut()
        .ok_or_else(|| HuskError::bad_request(format!("version {} must be an object", version)))?
        .get_mut(DIST)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| HuskError::MissingField {
            field: format!("{}.{}.{}", VERSIONS, version, DIST),
        })?;

    let tarball = dist
        .get(TARBALL)
        .and_then(Value::as_str)
        .ok_or_else(|| HuskError::MissingField {
            field: format!("{}.{}.{}.{}", VERSIONS, version, DIST, TARBALL),
        })?;
    let relative = VersionPathResolver::relative_path(tarball)?;
    dist.insert(TARBALL.to_string(), Value::String(relative));

    Ok(manifest)
}

#[cfg(test)]
mod tests;
