//! Tarball path recovery from upload URLs
//!
//! npm rewrites tarball URLs by repeating the scope and name on both sides of
//! a `-` separator (`@scope/name/-/@scope/name-1.0.0.tgz`); manual uploads
//! with curl do not. Four shapes are tried in a fixed order and the first
//! match wins.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use husk_core::error::HuskError;

use crate::RegistryResult;

/// Separator segment between the package prefix and the tarball file
const SEPARATOR: &str = "-";

static NPM_SCOPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|/)(?P<path>(?P<scope>@[^/]+)/(?P<name>[^/@][^/]*)/-/(?P<scope2>@[^/]+)/(?P<file>[^/]+\.tgz))$",
    )
    .expect("npm scoped pattern is valid")
});

static CURL_SCOPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|/)(?P<path>(?P<scope>@[^/]+)/(?P<name>[^/@][^/]*)/(?P<middle>(?:[^/]+/)*)(?P<file>[^/]+\.tgz))$",
    )
    .expect("curl scoped pattern is valid")
});

static NPM_UNSCOPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|/)(?P<path>(?P<name>[^/@][^/]*)/-/(?P<file>[^/]+\.tgz))$")
        .expect("npm unscoped pattern is valid")
});

static CURL_UNSCOPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|/)(?P<path>(?P<name>[^/@][^/]*)/(?P<file>[^/]+\.tgz))$")
        .expect("curl unscoped pattern is valid")
});

/// Which URL shape produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathShape {
    /// `@scope/name/-/@scope/name-<version>.tgz`
    NpmScoped,
    /// `@scope/name/[dirs/]name-<version>.tgz`
    CurlScoped,
    /// `name/-/name-<version>.tgz`
    NpmUnscoped,
    /// `name/name-<version>.tgz`
    CurlUnscoped,
}

impl PathShape {
    /// Shapes that carry the `-` separator segment
    pub fn has_separator(self) -> bool {
        matches!(self, PathShape::NpmScoped | PathShape::NpmUnscoped)
    }
}

/// A tarball location recovered from an upload URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub shape: PathShape,
    /// Full package name, including the scope
    pub package: String,
    pub version: String,
    /// Package-relative storage path
    pub path: String,
}

impl ResolvedPath {
    /// Same path with the `-` separator replaced by the version
    pub fn version_partitioned(&self) -> String {
        if !self.shape.has_separator() {
            return self.path.clone();
        }
        let prefix = format!("{}/{}/", self.package, SEPARATOR);
        match self.path.strip_prefix(&prefix) {
            Some(file) => format!("{}/{}/{}", self.package, self.version, file),
            None => self.path.clone(),
        }
    }
}

/// Recovers package-relative tarball paths from absolute upload URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionPathResolver;

impl VersionPathResolver {
    /// Match `url` against the four shapes in priority order
    pub fn resolve(url: &str) -> RegistryResult<ResolvedPath> {
        let path = normalize(url);

        if let Some(resolved) = NPM_SCOPED.captures(&path).and_then(|c| npm_scoped(&c)) {
            return Ok(resolved);
        }
        if let Some(resolved) = CURL_SCOPED.captures(&path).and_then(|c| curl_scoped(&c)) {
            return Ok(resolved);
        }
        if let Some(resolved) = NPM_UNSCOPED
            .captures(&path)
            .and_then(|c| unscoped(&c, PathShape::NpmUnscoped))
        {
            return Ok(resolved);
        }
        if let Some(resolved) = CURL_UNSCOPED
            .captures(&path)
            .and_then(|c| unscoped(&c, PathShape::CurlUnscoped))
        {
            return Ok(resolved);
        }

        Err(HuskError::not_found("relative path"))
    }

    /// Package-relative path of the tarball `url` points at
    pub fn relative_path(url: &str) -> RegistryResult<String> {
        Self::resolve(url).map(|resolved| resolved.path)
    }

    /// Like [`relative_path`](Self::relative_path), with `-` replaced by the version
    pub fn version_partitioned_path(url: &str) -> RegistryResult<String> {
        Self::resolve(url).map(|resolved| resolved.version_partitioned())
    }
}

/// Drop scheme, host, query and fragment; decode the escapes npm uses for scopes
fn normalize(url: &str) -> String {
    let without_suffix = url.split(['?', '#']).next().unwrap_or_default();
    let path = match without_suffix.find("://") {
        Some(idx) => {
            let rest = &without_suffix[idx + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        },
        None => without_suffix,
    };

    path.trim_start_matches('/')
        .replace("%40", "@")
        .replace("%2f", "/")
        .replace("%2F", "/")
}

/// `<name>-<version>.tgz` -> `<version>`
fn version_from_file(file: &str, name: &str) -> Option<String> {
    let version = file
        .strip_prefix(name)?
        .strip_prefix('-')?
        .strip_suffix(".tgz")?;
    if version.is_empty() {
        return None;
    }
    Some(version.to_string())
}

fn npm_scoped(caps: &Captures<'_>) -> Option<ResolvedPath> {
    let scope = caps.name("scope")?.as_str();
    let name = caps.name("name")?.as_str();
    if caps.name("scope2")?.as_str() != scope {
        return None;
    }
    let version = version_from_file(caps.name("file")?.as_str(), name)?;

    Some(ResolvedPath {
        shape: PathShape::NpmScoped,
        package: format!("{}/{}", scope, name),
        version,
        path: caps.name("path")?.as_str().to_string(),
    })
}

fn curl_scoped(caps: &Captures<'_>) -> Option<ResolvedPath> {
    let scope = caps.name("scope")?.as_str();
    let name = caps.name("name")?.as_str();
    let middle = caps.name("middle").map_or("", |m| m.as_str());
    // The npm double-scope form belongs to the first shape only
    if middle.starts_with(&format!("{}/@", SEPARATOR)) {
        return None;
    }
    let version = version_from_file(caps.name("file")?.as_str(), name)?;

    Some(ResolvedPath {
        shape: PathShape::CurlScoped,
        package: format!("{}/{}", scope, name),
        version,
        path: caps.name("path")?.as_str().to_string(),
    })
}

fn unscoped(caps: &Captures<'_>, shape: PathShape) -> Option<ResolvedPath> {
    let name = caps.name("name")?.as_str();
    let version = version_from_file(caps.name("file")?.as_str(), name)?;

    Some(ResolvedPath {
        shape,
        package: name.to_string(),
        version,
        path: caps.name("path")?.as_str().to_string(),
    })
}
