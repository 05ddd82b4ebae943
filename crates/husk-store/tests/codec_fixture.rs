//! Tarball codec against a checked-in `npm pack` style archive

use base64::{engine::general_purpose, Engine as _};
use husk_core::HuskError;
use husk_store::tarball::{decode, extract_file, extract_package_json, TarballPayload};
use serde_json::json;

const FIXTURE: &[u8] = include_bytes!("fixtures/simple-npm-project-1.0.2.tgz");

#[test]
fn test_extract_package_json_from_fixture() {
    let manifest = extract_package_json(FIXTURE).unwrap();
    assert_eq!(
        manifest,
        json!({"name": "@hello/simple-npm-project", "version": "1.0.2"})
    );
}

#[test]
fn test_extract_other_entry_from_fixture() {
    let readme = extract_file(FIXTURE, "README.md").unwrap();
    assert!(String::from_utf8(readme).unwrap().starts_with("# simple-npm-project"));
}

#[test]
fn test_base64_envelope_payload() {
    let payload = TarballPayload::base64(general_purpose::STANDARD.encode(FIXTURE));
    let bytes = decode(&payload).unwrap();
    assert_eq!(bytes, FIXTURE);

    let manifest = extract_package_json(&bytes).unwrap();
    assert_eq!(manifest["version"], "1.0.2");
}

#[test]
fn test_raw_single_byte_payload() {
    let text: String = FIXTURE.iter().map(|&b| char::from(b)).collect();
    let bytes = decode(&TarballPayload::raw(text)).unwrap();
    assert_eq!(bytes, FIXTURE);
}

#[test]
fn test_truncated_archive_is_codec_error() {
    let truncated = &FIXTURE[..FIXTURE.len() / 3];
    let err = extract_package_json(truncated).unwrap_err();
    assert!(matches!(err, HuskError::Codec { .. }), "got {:?}", err);
}
