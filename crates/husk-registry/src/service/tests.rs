//! Tests for hosted registry operations

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use husk_core::types::metadata::{DEPRECATED, DIST_TAGS};
use husk_core::utils::ManualClock;
use husk_store::{build_tarball, MemoryStorage, Storage};

use super::*;

fn registry() -> (Arc<MemoryStorage>, HostedRegistry) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let storage = Arc::new(MemoryStorage::new());
    let registry = HostedRegistry::new(storage.clone(), clock, "http://localhost:4873/npm/");
    (storage, registry)
}

fn tarball(name: &str, version: &str) -> Bytes {
    let manifest = json!({ "name": name, "version": version }).to_string();
    Bytes::from(build_tarball(&[("package/package.json", manifest.as_bytes())]).unwrap())
}

async fn publish(registry: &HostedRegistry, name: &str, versions: &[&str]) -> MetadataDocument {
    let mut doc = None;
    for version in versions {
        doc = Some(registry.put_tarball(tarball(name, version)).await.unwrap());
    }
    doc.unwrap()
}

/// What npm sends for `unpublish <name>@<version>`: the document minus one version
fn without_version(doc: &MetadataDocument, version: &str) -> Vec<u8> {
    let mut value = doc.clone().into_value();
    value[VERSIONS].as_object_mut().unwrap().remove(version);
    serde_json::to_vec(&value).unwrap()
}

#[tokio::test]
async fn test_serve_rewrites_tarballs() {
    let (_, registry) = registry();
    publish(&registry, "@hello/world", &["1.0.0"]).await;

    let served = registry.package_metadata("@hello%2fworld").await.unwrap();
    assert_eq!(
        served[VERSIONS]["1.0.0"][DIST][TARBALL],
        "http://localhost:4873/npm/@hello/world/-/@hello/world-1.0.0.tgz"
    );

    let stored = registry.document("@hello/world").await.unwrap();
    assert_eq!(
        stored.get(&[VERSIONS, "1.0.0", DIST, TARBALL]),
        Some(&json!("@hello/world/-/@hello/world-1.0.0.tgz"))
    );
}

#[tokio::test]
async fn test_asset() {
    let (_, registry) = registry();
    publish(&registry, "left-pad", &["1.0.0"]).await;

    let bytes = registry.asset("/left-pad/-/left-pad-1.0.0.tgz").await.unwrap();
    assert_eq!(bytes, tarball("left-pad", "1.0.0"));

    let err = registry.asset("left-pad/-/left-pad-9.9.9.tgz").await.unwrap_err();
    assert!(matches!(err, HuskError::NotFound { .. }));
    assert!(registry.asset("../secret").await.is_err());
}

#[tokio::test]
async fn test_put_package_dispatch() {
    let (storage, registry) = registry();
    let doc = publish(&registry, "left-pad", &["1.0.0", "1.1.0"]).await;

    // deprecate
    let mut deprecate = doc.clone().into_value();
    deprecate[VERSIONS]["1.0.0"][DEPRECATED] = json!("please upgrade");
    let updated = registry
        .put_package(
            "left-pad",
            Some("deprecate left-pad@1.0.0 \"please upgrade\""),
            &serde_json::to_vec(&deprecate).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        updated.get(&[VERSIONS, "1.0.0", DEPRECATED]),
        Some(&json!("please upgrade"))
    );

    // unpublish one version
    let updated = registry
        .put_package("left-pad", Some("unpublish left-pad@1.1.0"), &without_version(&updated, "1.1.0"))
        .await
        .unwrap();
    assert_eq!(updated.version_keys().len(), 1);
    assert_eq!(updated.get(&[DIST_TAGS, LATEST]), Some(&json!("1.0.0")));
    assert!(!storage.exists("left-pad/-/left-pad-1.1.0.tgz").await.unwrap());
    assert!(storage.exists("left-pad/-/left-pad-1.0.0.tgz").await.unwrap());
}

#[tokio::test]
async fn test_put_package_name_mismatch() {
    let (_, registry) = registry();
    let body = serde_json::to_vec(&json!({"name": "other", "versions": {}})).unwrap();
    let err = registry.put_package("left-pad", None, &body).await.unwrap_err();
    assert!(matches!(err, HuskError::BadRequest { .. }));
}

#[tokio::test]
async fn test_unpublish_unknown_package() {
    let (_, registry) = registry();
    let body = serde_json::to_vec(&json!({"name": "left-pad", "versions": {}})).unwrap();
    let err = registry
        .put_package("left-pad", Some("unpublish left-pad@1.0.0"), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, HuskError::NotFound { .. }));
}

#[tokio::test]
async fn test_dist_tag_lifecycle() {
    let (_, registry) = registry();
    publish(&registry, "left-pad", &["1.0.0", "2.0.0"]).await;

    let tags = registry.put_dist_tag("left-pad", "legacy", b"\"1.0.0\"").await.unwrap();
    assert_eq!(tags.get("legacy"), Some(&json!("1.0.0")));

    let tags = registry.put_dist_tag("left-pad", "next", b"2.0.0\n").await.unwrap();
    assert_eq!(tags.get("next"), Some(&json!("2.0.0")));

    let tags = registry.dist_tags("left-pad").await.unwrap();
    assert_eq!(tags.len(), 3);
    assert_eq!(tags.get(LATEST), Some(&json!("2.0.0")));

    let tags = registry.delete_dist_tag("left-pad", "legacy").await.unwrap();
    assert!(tags.get("legacy").is_none());

    let err = registry.delete_dist_tag("left-pad", LATEST).await.unwrap_err();
    assert!(matches!(err, HuskError::BadRequest { .. }));
    assert!(registry.put_dist_tag("left-pad", "empty", b"").await.is_err());
}

#[tokio::test]
async fn test_dist_tag_unknown_package() {
    let (_, registry) = registry();
    let err = registry.put_dist_tag("nope", "beta", b"1.0.0").await.unwrap_err();
    assert!(matches!(err, HuskError::NotFound { .. }));
    let err = registry.dist_tags("nope").await.unwrap_err();
    assert!(matches!(err, HuskError::NotFound { .. }));
}

#[tokio::test]
async fn test_unpublish_all() {
    let (storage, registry) = registry();
    publish(&registry, "left-pad", &["1.0.0", "1.1.0"]).await;
    publish(&registry, "left-pad-extra", &["1.0.0"]).await;

    let removed = registry.delete("/left-pad/-rev/3-abc").await.unwrap();
    assert_eq!(removed, 3);
    assert!(storage.list("left-pad/").await.unwrap().is_empty());
    assert_eq!(storage.list("left-pad-extra/").await.unwrap().len(), 2);

    let err = registry.unpublish_all("left-pad").await.unwrap_err();
    assert!(matches!(err, HuskError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_tarball_path() {
    let (storage, registry) = registry();
    publish(&registry, "@hello/world", &["1.0.0"]).await;

    let removed = registry
        .delete("/@hello%2fworld/-/@hello/world-1.0.0.tgz/-rev/2-def")
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(!storage.exists("@hello/world/-/@hello/world-1.0.0.tgz").await.unwrap());
    assert!(storage.exists("@hello/world/meta.json").await.unwrap());
}

#[test]
fn test_package_name_validation() {
    assert_eq!(package_name("left-pad").unwrap(), "left-pad");
    assert_eq!(package_name("@scope%2Fname").unwrap(), "@scope/name");
    assert!(package_name("left-pad/extra").is_err());
    assert!(package_name("@scope").is_err());
    assert!(package_name("..").is_err());
    assert!(package_name("").is_err());
}
