//! Tarball codec
//!
//! Uploaded archives reach the registry either base64-encoded inside a publish
//! envelope or as a raw request body. This module decodes both shapes and
//! pulls single entries (in practice `package.json`) out of the gzip+tar
//! stream without unpacking anything to disk.

pub mod create;
pub mod decode;
pub mod extract;

// Re-export main functions
pub use create::{build_tarball, create_tarball};
pub use decode::{decode, TarballPayload};
pub use extract::{extract_file, extract_package_json, PACKAGE_JSON};
