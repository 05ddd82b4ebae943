//! npm registry protocol request types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use husk_core::error::HuskError;
use husk_core::types::metadata::{ATTACHMENTS, NAME, VERSIONS};

use crate::RegistryResult;

/// Tarball attachment inside a publish envelope
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Attachment {
    /// MIME type, usually `application/octet-stream`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Base64-encoded tarball
    pub data: String,
    /// Decoded length in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// Document produced by `npm publish`, `npm deprecate` and `npm unpublish`
#[derive(Debug, Clone, PartialEq)]
pub struct PublishEnvelope {
    body: Map<String, Value>,
}

impl PublishEnvelope {
    /// Parse a request body
    pub fn from_slice(bytes: &[u8]) -> RegistryResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> RegistryResult<Self> {
        match value {
            Value::Object(body) => Ok(Self { body }),
            _ => Err(HuskError::bad_request("publish body must be a JSON object")),
        }
    }

    /// Package name, required on every envelope
    pub fn name(&self) -> RegistryResult<&str> {
        self.body
            .get(NAME)
            .and_then(Value::as_str)
            .ok_or_else(|| HuskError::MissingField {
                field: NAME.to_string(),
            })
    }

    /// `versions` object, required on every envelope
    pub fn versions(&self) -> RegistryResult<&Map<String, Value>> {
        self.body
            .get(VERSIONS)
            .and_then(Value::as_object)
            .ok_or_else(|| HuskError::MissingField {
                field: VERSIONS.to_string(),
            })
    }

    /// Decoded `_attachments`, in envelope order
    pub fn attachments(&self) -> RegistryResult<Vec<(String, Attachment)>> {
        let Some(attachments) = self.body.get(ATTACHMENTS) else {
            return Ok(Vec::new());
        };
        let attachments = attachments
            .as_object()
            .ok_or_else(|| HuskError::bad_request("_attachments must be an object"))?;

        attachments
            .iter()
            .map(|(name, value)| {
                let attachment: Attachment = serde_json::from_value(value.clone()).map_err(|e| {
                    HuskError::bad_request(format!("invalid attachment '{}': {}", name, e))
                })?;
                Ok((name.clone(), attachment))
            })
            .collect()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.body.clone())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }
}

/// Operation a package PUT stands for, recovered from npm's `referer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefererHint {
    Publish,
    Unpublish,
    Deprecate,
}

impl RefererHint {
    /// npm sends e.g. `unpublish left-pad@1.0.0` or `deprecate left-pad "msg"`
    pub fn from_header(referer: Option<&str>) -> Self {
        match referer.map(str::trim_start) {
            Some(r) if r.starts_with("unpublish") => RefererHint::Unpublish,
            Some(r) if r.starts_with("deprecate") => RefererHint::Deprecate,
            _ => RefererHint::Publish,
        }
    }
}

/// The `name`/`version` pair every package.json must carry
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
}

impl PackageManifest {
    pub fn from_value(manifest: &Value) -> RegistryResult<Self> {
        let field = |key: &str| {
            manifest
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| HuskError::MissingField {
                    field: format!("package.json {}", key),
                })
        };

        Ok(Self {
            name: field("name")?,
            version: field("version")?,
        })
    }
}
