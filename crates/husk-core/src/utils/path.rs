//! Storage key helpers.
//!
//! Keys are `/`-separated paths relative to the storage root. The hosted
//! layout is `<pkg>/meta.json` plus `<pkg>/-/<pkg>-<version>.tgz`; the proxy
//! cache adds `<key>.meta` sidecars.

/// File name of the metadata document inside a package prefix
pub const META_FILE: &str = "meta.json";

/// Suffix of proxy cache sidecar keys
pub const SIDECAR_SUFFIX: &str = ".meta";

/// Check that a key stays inside the storage root
pub fn is_safe_key(key: &str) -> bool {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return false;
    }

    key.split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// `<pkg>/`
pub fn package_prefix(package: &str) -> String {
    format!("{}/", package)
}

/// `<pkg>/meta.json`
pub fn meta_key(package: &str) -> String {
    format!("{}/{}", package, META_FILE)
}

/// `<pkg>-<version>.tgz`
pub fn tarball_file_name(package: &str, version: &str) -> String {
    format!("{}-{}.tgz", package, version)
}

/// `<pkg>/-/<pkg>-<version>.tgz`
pub fn tarball_key(package: &str, version: &str) -> String {
    format!("{}/-/{}", package, tarball_file_name(package, version))
}

/// `<key>.meta`
pub fn sidecar_key(key: &str) -> String {
    format!("{}{}", key, SIDECAR_SUFFIX)
}
