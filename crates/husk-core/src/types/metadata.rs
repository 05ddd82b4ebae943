//! The consolidated per-package metadata document (`meta.json`).
//!
//! A `MetadataDocument` is an ordered JSON object. It is never mutated in
//! place: every update is expressed as a list of [`Patch`]es and
//! [`MetadataDocument::apply`] returns a new document, leaving the original
//! untouched when any patch fails.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::{HuskError, HuskResult};

pub const NAME: &str = "name";
pub const ID: &str = "_id";
pub const README: &str = "readme";
pub const TIME: &str = "time";
pub const DIST_TAGS: &str = "dist-tags";
pub const VERSIONS: &str = "versions";
pub const USERS: &str = "users";
pub const ATTACHMENTS: &str = "_attachments";
pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";
pub const LATEST: &str = "latest";
pub const DIST: &str = "dist";
pub const TARBALL: &str = "tarball";
pub const DEPRECATED: &str = "deprecated";

/// A single field-level update addressed by path segments.
///
/// Segments are kept separate rather than dot-joined because version keys
/// themselves contain dots.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Set the field, creating missing parent objects
    Set { path: Vec<String>, value: Value },
    /// Remove the field if present
    Remove { path: Vec<String> },
}

impl Patch {
    pub fn set<S: AsRef<str>>(path: &[S], value: Value) -> Self {
        Patch::Set {
            path: path.iter().map(|s| s.as_ref().to_string()).collect(),
            value,
        }
    }

    pub fn remove<S: AsRef<str>>(path: &[S]) -> Self {
        Patch::Remove {
            path: path.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Path segments this patch addresses
    pub fn path(&self) -> &[String] {
        match self {
            Patch::Set { path, .. } | Patch::Remove { path } => path,
        }
    }
}

/// In-memory representation of one package's `meta.json`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataDocument {
    root: Map<String, Value>,
}

impl MetadataDocument {
    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> HuskResult<Self> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(HuskError::JsonParse {
                message: format!("metadata must be a JSON object, got {}", json_kind(&other)),
            }),
        }
    }

    /// Parse stored `meta.json` bytes
    pub fn from_slice(bytes: &[u8]) -> HuskResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Serialize for storage
    pub fn to_vec(&self) -> HuskResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.root)?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    pub fn name(&self) -> Option<&str> {
        self.root.get(NAME).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.root.get(ID).and_then(Value::as_str)
    }

    pub fn readme(&self) -> Option<&str> {
        self.root.get(README).and_then(Value::as_str)
    }

    pub fn dist_tags(&self) -> Option<&Map<String, Value>> {
        self.root.get(DIST_TAGS).and_then(Value::as_object)
    }

    pub fn versions(&self) -> Option<&Map<String, Value>> {
        self.root.get(VERSIONS).and_then(Value::as_object)
    }

    pub fn time(&self) -> Option<&Map<String, Value>> {
        self.root.get(TIME).and_then(Value::as_object)
    }

    /// Keys of the `versions` object, empty when the object is absent
    pub fn version_keys(&self) -> BTreeSet<String> {
        self.versions()
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a nested field by path segments
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Apply patches in order and return the updated document.
    ///
    /// Fails without side effects if a patch would descend through a
    /// non-object value.
    pub fn apply(&self, patches: &[Patch]) -> HuskResult<Self> {
        let mut root = self.root.clone();
        for patch in patches {
            match patch {
                Patch::Set { path, value } => set_path(&mut root, path, value.clone())?,
                Patch::Remove { path } => remove_path(&mut root, path),
            }
        }
        Ok(Self { root })
    }

    /// Rewrite every `versions.*.dist.tarball` string with `rewrite`
    pub fn map_tarballs<F>(&self, rewrite: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        let mut root = self.root.clone();
        if let Some(Value::Object(versions)) = root.get_mut(VERSIONS) {
            for version in versions.values_mut() {
                let tarball = version
                    .get_mut(DIST)
                    .and_then(|dist| dist.get_mut(TARBALL));
                if let Some(Value::String(url)) = tarball {
                    *url = rewrite(url);
                }
            }
        }
        Self { root }
    }
}

fn set_path(root: &mut Map<String, Value>, path: &[String], value: Value) -> HuskResult<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(HuskError::bad_request("patch path must not be empty"));
    };

    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            other => {
                return Err(HuskError::bad_request(format!(
                    "cannot set '{}' below {} field '{}'",
                    path.join("/"),
                    json_kind(other),
                    segment
                )))
            }
        };
    }
    current.insert(last.clone(), value);
    Ok(())
}

fn remove_path(root: &mut Map<String, Value>, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        match current.get_mut(segment) {
            Some(Value::Object(map)) => current = map,
            _ => return,
        }
    }
    current.shift_remove(last);
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
