//! Tarball creation functionality
//!
//! Packs a directory (or an in-memory file list) into an npm-compatible
//! gzip+tar archive. Directory packing places every file under `package/`,
//! the prefix `npm pack` uses.

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use husk_core::error::HuskError;
use tar::{Builder, Header};
use walkdir::WalkDir;

use crate::StoreResult;

/// Create an npm-compatible tarball from a directory
pub fn create_tarball<W: Write>(writer: W, source_dir: &Path) -> StoreResult<()> {
    let gz_encoder = GzEncoder::new(writer, Compression::default());
    let mut tar_builder = Builder::new(gz_encoder);

    let mut entries: Vec<_> = WalkDir::new(source_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .collect();
    // Stable archive order regardless of directory iteration order
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        let path = entry.path();
        let relative_path = path.strip_prefix(source_dir).map_err(|e| HuskError::Codec {
            message: format!("Failed to strip prefix: {}", e),
            source: None,
        })?;

        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let npm_path = Path::new("package").join(relative_path);

        if entry.file_type().is_file() {
            tar_builder
                .append_path_with_name(path, &npm_path)
                .map_err(|e| HuskError::io(format!("Failed to add {}", path.display()), e))?;
        } else if entry.file_type().is_dir() {
            tar_builder
                .append_dir(&npm_path, path)
                .map_err(|e| HuskError::io(format!("Failed to add {}", path.display()), e))?;
        }
        // Symlinks and special files are not part of npm tarballs
    }

    let gz_encoder = tar_builder
        .into_inner()
        .map_err(|e| HuskError::io("Failed to finish tarball".to_string(), e))?;
    gz_encoder
        .finish()
        .map_err(|e| HuskError::io("Failed to finish gzip stream".to_string(), e))?;

    Ok(())
}

/// Build a tarball from in-memory `(path, content)` pairs, in the given order
pub fn build_tarball(files: &[(&str, &[u8])]) -> StoreResult<Vec<u8>> {
    let gz_encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar_builder = Builder::new(gz_encoder);

    for (path, content) in files {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder
            .append_data(&mut header, path, *content)
            .map_err(|e| HuskError::io(format!("Failed to add {}", path), e))?;
    }

    let gz_encoder = tar_builder
        .into_inner()
        .map_err(|e| HuskError::io("Failed to finish tarball".to_string(), e))?;
    gz_encoder
        .finish()
        .map_err(|e| HuskError::io("Failed to finish gzip stream".to_string(), e))
}
