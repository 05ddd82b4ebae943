//! Single-entry extraction
//!
//! Entries are scanned in archive order and matched on the final path
//! segment, so `package/package.json` and `pkg/package.json` both match
//! `package.json`.

use std::ffi::OsStr;
use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use husk_core::error::HuskError;
use serde_json::Value;
use tar::Archive;

use crate::StoreResult;

/// Manifest file every npm tarball carries
pub const PACKAGE_JSON: &str = "package.json";

/// Return the contents of the first entry named `filename`
pub fn extract_file(bytes: &[u8], filename: &str) -> StoreResult<Vec<u8>> {
    let gz_decoder = GzDecoder::new(Cursor::new(bytes));
    let mut archive = Archive::new(gz_decoder);

    let entries = archive
        .entries()
        .map_err(|e| HuskError::codec("Failed to open tarball".to_string(), e))?;

    for entry_result in entries {
        let mut entry =
            entry_result.map_err(|e| HuskError::codec("Corrupt tarball entry".to_string(), e))?;

        if entry.header().entry_type().is_dir() {
            continue;
        }

        let matches = {
            let path = entry
                .path()
                .map_err(|e| HuskError::codec("Invalid tarball entry path".to_string(), e))?;
            path.file_name() == Some(OsStr::new(filename))
        };

        if matches {
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| HuskError::codec(format!("Failed to read {}", filename), e))?;
            return Ok(content);
        }
    }

    Err(HuskError::not_found(format!("file '{}' in tarball", filename)))
}

/// Extract and parse `package.json`
pub fn extract_package_json(bytes: &[u8]) -> StoreResult<Value> {
    let content = extract_file(bytes, PACKAGE_JSON)?;
    Ok(serde_json::from_slice(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarball::build_tarball;

    #[test]
    fn test_extract_nested_file() {
        let tarball = build_tarball(&[
            ("package/index.js", b"console.log(1)".as_slice()),
            ("package/lib/util.js", b"module.exports = {}".as_slice()),
        ])
        .unwrap();

        let content = extract_file(&tarball, "util.js").unwrap();
        assert_eq!(content, b"module.exports = {}");
    }

    #[test]
    fn test_first_match_wins() {
        let tarball = build_tarball(&[
            ("package/package.json", br#"{"name":"first"}"#.as_slice()),
            ("package/node_modules/dep/package.json", br#"{"name":"second"}"#.as_slice()),
        ])
        .unwrap();

        let json = extract_package_json(&tarball).unwrap();
        assert_eq!(json["name"], "first");
    }

    #[test]
    fn test_missing_entry() {
        let tarball = build_tarball(&[("package/index.js", b"1".as_slice())]).unwrap();
        let err = extract_file(&tarball, PACKAGE_JSON).unwrap_err();
        assert!(matches!(err, HuskError::NotFound { .. }));
    }

    #[test]
    fn test_not_gzip() {
        let err = extract_file(b"definitely not an archive", PACKAGE_JSON).unwrap_err();
        assert!(matches!(err, HuskError::Codec { .. }));
    }

    #[test]
    fn test_suffix_is_not_a_match() {
        let tarball = build_tarball(&[("package/my-package.json", b"{}".as_slice())]).unwrap();
        assert!(extract_file(&tarball, PACKAGE_JSON).is_err());
    }
}
