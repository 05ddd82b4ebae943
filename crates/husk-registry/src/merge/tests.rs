//! Tests for the metadata merge engine

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use husk_core::utils::ManualClock;

use super::*;

fn engine() -> (Arc<ManualClock>, MetadataMergeEngine) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));
    let engine = MetadataMergeEngine::new(clock.clone());
    (clock, engine)
}

fn envelope(name: &str, versions: &[&str]) -> Value {
    let mut map = serde_json::Map::new();
    for version in versions {
        map.insert(
            version.to_string(),
            json!({
                "name": name,
                "version": version,
                "dist": {
                    "tarball": format!("http://localhost:4873/{0}/-/{0}-{1}.tgz", name, version),
                    "shasum": "abc"
                }
            }),
        );
    }
    json!({
        "_id": name,
        "name": name,
        "readme": "# readme",
        "dist-tags": { "latest": versions.last().copied().unwrap_or("0.0.0") },
        "versions": Value::Object(map),
    })
}

fn published(engine: &MetadataMergeEngine, name: &str, versions: &[&str]) -> MetadataDocument {
    let uploaded = envelope(name, versions);
    let skeleton = engine.create_skeleton(&uploaded).unwrap();
    engine.apply_publish(&skeleton, &uploaded).unwrap()
}

fn without_time(doc: &MetadataDocument) -> Value {
    let mut value = doc.clone().into_value();
    if let Some(map) = value.as_object_mut() {
        map.remove(TIME);
    }
    value
}

#[test]
fn test_skeleton_fields() {
    let (_, engine) = engine();
    let doc = engine.create_skeleton(&envelope("left-pad", &["1.0.0"])).unwrap();

    assert_eq!(doc.name(), Some("left-pad"));
    assert_eq!(doc.id(), Some("left-pad"));
    assert_eq!(doc.readme(), Some("# readme"));
    assert_eq!(doc.get(&[TIME, CREATED]), Some(&json!("2024-03-01T12:00:00.000Z")));
    assert_eq!(doc.get(&[USERS]), Some(&json!({})));
    assert_eq!(doc.get(&[VERSIONS]), Some(&json!({})));
    assert_eq!(doc.get(&[ATTACHMENTS]), Some(&json!({})));
    assert!(doc.dist_tags().is_none());
}

#[test]
fn test_skeleton_requires_fields() {
    let (_, engine) = engine();
    for field in [NAME, ID, README] {
        let mut uploaded = envelope("left-pad", &["1.0.0"]);
        uploaded.as_object_mut().unwrap().remove(field);
        let err = engine.create_skeleton(&uploaded).unwrap_err();
        assert!(matches!(err, HuskError::MissingField { field: ref f } if f == field));
    }
}

#[test]
fn test_publish_resolves_tarball_and_times() {
    let (_, engine) = engine();
    let doc = published(&engine, "@hello/world", &["1.0.1"]);

    assert_eq!(
        doc.get(&[VERSIONS, "1.0.1", DIST, TARBALL]),
        Some(&json!("@hello/world/-/@hello/world-1.0.1.tgz"))
    );
    assert_eq!(doc.get(&[VERSIONS, "1.0.1", DIST, "shasum"]), Some(&json!("abc")));
    assert_eq!(doc.get(&[DIST_TAGS, LATEST]), Some(&json!("1.0.1")));

    let stamp = json!("2024-03-01T12:00:00.000Z");
    assert_eq!(doc.get(&[TIME, "1.0.1"]), Some(&stamp));
    assert_eq!(doc.get(&[TIME, MODIFIED]), Some(&stamp));
}

#[test]
fn test_publish_keeps_earlier_versions() {
    let (clock, engine) = engine();
    let first = published(&engine, "left-pad", &["1.0.0"]);
    clock.advance(Duration::minutes(5));

    let second = engine
        .apply_publish(&first, &envelope("left-pad", &["1.1.0"]))
        .unwrap();

    assert_eq!(second.version_keys().len(), 2);
    assert_eq!(second.get(&[TIME, "1.0.0"]), first.get(&[TIME, "1.0.0"]));
    assert_eq!(second.get(&[TIME, "1.1.0"]), Some(&json!("2024-03-01T12:05:00.000Z")));
    assert_eq!(second.get(&[TIME, CREATED]), first.get(&[TIME, CREATED]));
    assert_eq!(second.get(&[DIST_TAGS, LATEST]), Some(&json!("1.1.0")));
    assert_eq!(second.readme(), Some("# readme"));
}

#[test]
fn test_every_version_has_time() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0", "1.0.1", "2.0.0"]);
    let time = doc.time().unwrap();
    for version in doc.version_keys() {
        assert!(time.contains_key(&version), "missing time for {}", version);
    }
}

#[test]
fn test_publish_errors() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0"]);

    let err = engine.apply_publish(&doc, &envelope("right-pad", &["1.0.1"])).unwrap_err();
    assert!(matches!(err, HuskError::BadRequest { .. }));

    let err = engine.apply_publish(&doc, &json!({"name": "left-pad"})).unwrap_err();
    assert!(matches!(err, HuskError::MissingField { .. }));

    let no_tarball = json!({"name": "left-pad", "versions": {"1.0.1": {"dist": {}}}});
    let err = engine.apply_publish(&doc, &no_tarball).unwrap_err();
    assert!(matches!(err, HuskError::MissingField { .. }));

    let bad_url = json!({"name": "left-pad", "versions": {"1.0.1": {"dist": {"tarball": "http://h/nowhere"}}}});
    let err = engine.apply_publish(&doc, &bad_url).unwrap_err();
    assert!(matches!(err, HuskError::NotFound { .. }));
}

#[test]
fn test_dist_tags() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0", "1.5.0"]);
    let modified = doc.get(&[TIME, MODIFIED]).cloned();

    let tagged = engine.apply_dist_tag(&doc, "beta", "1.5.0").unwrap();
    assert_eq!(tagged.get(&[DIST_TAGS, "beta"]), Some(&json!("1.5.0")));
    assert_eq!(tagged.get(&[TIME, MODIFIED]).cloned(), modified);

    let untagged = engine.remove_dist_tag(&tagged, "beta").unwrap();
    assert!(untagged.get(&[DIST_TAGS, "beta"]).is_none());
    assert_eq!(engine.remove_dist_tag(&untagged, "beta").unwrap(), untagged);

    assert!(engine.apply_dist_tag(&doc, "", "1.0.0").is_err());
}

#[test]
fn test_dist_tag_creates_object() {
    let (_, engine) = engine();
    let skeleton = engine.create_skeleton(&envelope("left-pad", &[])).unwrap();
    let tagged = engine.apply_dist_tag(&skeleton, "next", "1.0.0").unwrap();
    assert_eq!(tagged.dist_tags().unwrap().len(), 1);
}

#[test]
fn test_deprecate_selected_versions() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0", "1.1.0"]);

    let mut uploaded = doc.clone().into_value();
    uploaded[VERSIONS]["1.0.0"][DEPRECATED] = json!("use 1.1.0");
    uploaded[VERSIONS]["9.9.9"] = json!({ "deprecated": "ignored" });

    let deprecated = engine.apply_deprecate(&doc, &uploaded).unwrap();
    assert_eq!(
        deprecated.get(&[VERSIONS, "1.0.0", DEPRECATED]),
        Some(&json!("use 1.1.0"))
    );
    assert!(deprecated.get(&[VERSIONS, "1.1.0", DEPRECATED]).is_none());
    assert!(deprecated.get(&[VERSIONS, "9.9.9"]).is_none());

    // An empty message is how npm un-deprecates
    let mut undo = deprecated.clone().into_value();
    undo[VERSIONS]["1.0.0"][DEPRECATED] = json!("");
    let restored = engine.apply_deprecate(&deprecated, &undo).unwrap();
    assert_eq!(restored.get(&[VERSIONS, "1.0.0", DEPRECATED]), Some(&json!("")));
}

#[test]
fn test_unpublish_one_removes_version() {
    let (clock, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0", "1.1.0", "1.2.0"]);
    let doc = engine.apply_dist_tag(&doc, "1.2.0", "1.2.0").unwrap();
    let doc = engine.apply_dist_tag(&doc, "stable", "1.2.0").unwrap();
    clock.advance(Duration::hours(1));

    let (after, removed) = engine
        .apply_unpublish_one(&doc, &envelope("left-pad", &["1.0.0", "1.1.0"]))
        .unwrap();

    assert_eq!(removed, "1.2.0");
    assert!(after.get(&[VERSIONS, "1.2.0"]).is_none());
    assert!(after.get(&[TIME, "1.2.0"]).is_none());
    assert!(after.get(&[DIST_TAGS, "1.2.0"]).is_none());
    assert!(after.get(&[DIST_TAGS, "stable"]).is_none());
    assert_eq!(after.get(&[DIST_TAGS, LATEST]), Some(&json!("1.1.0")));
    assert_eq!(after.get(&[TIME, MODIFIED]), Some(&json!("2024-03-01T13:00:00.000Z")));
    assert_eq!(after.version_keys().len(), 2);
}

#[test]
fn test_unpublish_drops_tags_naming_the_version() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0", "1.5.0", "2.0.0"]);
    let doc = engine.apply_dist_tag(&doc, "next", "1.5.0").unwrap();
    let doc = engine.apply_dist_tag(&doc, "canary", "1.5.0").unwrap();
    let doc = engine.apply_dist_tag(&doc, "legacy", "1.0.0").unwrap();

    let (after, removed) = engine
        .apply_unpublish_one(&doc, &envelope("left-pad", &["1.0.0", "2.0.0"]))
        .unwrap();

    assert_eq!(removed, "1.5.0");
    let tags = after.dist_tags().unwrap();
    assert!(tags.get("next").is_none());
    assert!(tags.get("canary").is_none());
    assert_eq!(tags.get("legacy"), Some(&json!("1.0.0")));
    assert_eq!(tags.get(LATEST), Some(&json!("2.0.0")));
}

#[test]
fn test_unpublish_latest_uses_numeric_order() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.9.0", "1.10.0", "1.10"]);

    let (after, _) = engine
        .apply_unpublish_one(&doc, &envelope("left-pad", &["1.9.0", "1.10"]))
        .unwrap();
    assert_eq!(after.get(&[DIST_TAGS, LATEST]), Some(&json!("1.10")));
}

#[test]
fn test_unpublish_last_version_drops_latest() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0"]);
    let (after, _) = engine.apply_unpublish_one(&doc, &envelope("left-pad", &[])).unwrap();
    assert!(after.get(&[DIST_TAGS, LATEST]).is_none());
    assert!(after.version_keys().is_empty());
}

#[test]
fn test_unpublish_conflicts() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0", "1.1.0", "1.2.0"]);

    // No difference
    let err = engine
        .apply_unpublish_one(&doc, &envelope("left-pad", &["1.0.0", "1.1.0", "1.2.0"]))
        .unwrap_err();
    assert!(matches!(err, HuskError::Conflict { .. }));

    // Two differences
    let err = engine
        .apply_unpublish_one(&doc, &envelope("left-pad", &["1.0.0"]))
        .unwrap_err();
    assert!(matches!(err, HuskError::Conflict { .. }));

    // One difference, but on the wrong side
    let err = engine
        .apply_unpublish_one(&doc, &envelope("left-pad", &["1.0.0", "1.1.0", "1.2.0", "1.3.0"]))
        .unwrap_err();
    assert!(matches!(err, HuskError::Conflict { .. }));
}

#[test]
fn test_unpublish_rejects_non_numeric_versions() {
    let (_, engine) = engine();
    let doc = published(&engine, "left-pad", &["1.0.0", "1.1.0-rc1", "1.1.0"]);
    let err = engine
        .apply_unpublish_one(&doc, &envelope("left-pad", &["1.0.0", "1.1.0-rc1"]))
        .unwrap_err();
    assert!(matches!(err, HuskError::UnsupportedVersion { .. }));
}

fn version_strategy() -> impl Strategy<Value = String> {
    (0u32..20, 0u32..20, 0u32..20).prop_map(|(a, b, c)| format!("{}.{}.{}", a, b, c))
}

proptest! {
    #[test]
    fn prop_publish_is_idempotent(versions in prop::collection::btree_set(version_strategy(), 1..6)) {
        let (clock, engine) = engine();
        let versions: Vec<&str> = versions.iter().map(String::as_str).collect();
        let uploaded = envelope("left-pad", &versions);
        let skeleton = engine.create_skeleton(&uploaded).unwrap();

        let once = engine.apply_publish(&skeleton, &uploaded).unwrap();
        clock.advance(Duration::seconds(30));
        let twice = engine.apply_publish(&once, &uploaded).unwrap();

        prop_assert_eq!(without_time(&once), without_time(&twice));
    }

    #[test]
    fn prop_unpublish_removes_exactly_one(
        versions in prop::collection::btree_set(version_strategy(), 2..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let (_, engine) = engine();
        let all: Vec<&str> = versions.iter().map(String::as_str).collect();
        let doc = published(&engine, "left-pad", &all);

        let target = all[pick.index(all.len())];
        let remaining: Vec<&str> = all.iter().copied().filter(|v| *v != target).collect();
        let (after, removed) = engine
            .apply_unpublish_one(&doc, &envelope("left-pad", &remaining))
            .unwrap();

        prop_assert_eq!(removed.as_str(), target);
        prop_assert_eq!(after.version_keys().len(), all.len() - 1);
        prop_assert!(after.get(&[TIME, target]).is_none());
    }
}
