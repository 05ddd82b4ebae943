//! Tarball URL rewriting for proxied metadata
//!
//! Documents are stored with cache-relative tarball paths so a cached copy
//! survives a change of public address, and get absolute URLs again on the
//! way out to a client.

use bytes::Bytes;
use url::Url;

use husk_core::MetadataDocument;

use crate::ProxyResult;

/// Direction of a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformTarget {
    /// Upstream absolute URLs to cache-relative paths
    CachedContent,
    /// Cache-relative paths to `<public base>/<path>`
    ClientContent,
}

/// Rewrites every `versions.*.dist.tarball` of a metadata document
#[derive(Debug, Clone)]
pub struct ContentTransform {
    upstream_base: String,
    public_base: String,
}

impl ContentTransform {
    pub fn new(upstream_base: impl Into<String>, public_base: impl Into<String>) -> Self {
        Self {
            upstream_base: upstream_base.into().trim_end_matches('/').to_string(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn public_base(&self) -> &str {
        &self.public_base
    }

    /// Rewrite `body` for `target`; fails if `body` is not a JSON object
    pub fn apply(&self, target: TransformTarget, body: &[u8]) -> ProxyResult<Bytes> {
        let doc = MetadataDocument::from_slice(body)?;
        let rewritten = match target {
            TransformTarget::CachedContent => doc.map_tarballs(|url| self.cache_relative(url)),
            TransformTarget::ClientContent => doc.map_tarballs(|path| self.client_absolute(path)),
        };
        Ok(Bytes::from(rewritten.to_vec()?))
    }

    pub fn to_cached(&self, body: &[u8]) -> ProxyResult<Bytes> {
        self.apply(TransformTarget::CachedContent, body)
    }

    pub fn to_client(&self, body: &[u8]) -> ProxyResult<Bytes> {
        self.apply(TransformTarget::ClientContent, body)
    }

    fn cache_relative(&self, url: &str) -> String {
        if let Some(path) = url
            .strip_prefix(&self.upstream_base)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            return path.to_string();
        }

        // Tarballs hosted elsewhere keep their path and are fetched through
        // the upstream like any other asset
        match Url::parse(url) {
            Ok(parsed) if parsed.has_host() => parsed.path().trim_start_matches('/').to_string(),
            _ => url.to_string(),
        }
    }

    fn client_absolute(&self, path: &str) -> String {
        if is_absolute(path) {
            path.to_string()
        } else {
            format!("{}/{}", self.public_base, path.trim_start_matches('/'))
        }
    }
}

fn is_absolute(url: &str) -> bool {
    url.contains("://")
}
