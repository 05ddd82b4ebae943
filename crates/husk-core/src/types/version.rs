//! Version ordering used when recomputing the `latest` dist-tag.
//!
//! Versions are split on `.` and compared component by component as unsigned
//! integers. When every shared component ties, the version with more
//! components sorts higher, so `1.0 < 1.0.0`. Pre-release suffixes such as
//! `1.0.0-rc1` are not ordered; parsing them fails with
//! [`VersionError::InvalidNumber`].

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::HuskError;

/// A version string together with its numeric components
#[derive(Debug, Clone)]
pub struct VersionKey {
    raw: String,
    components: Vec<u64>,
}

/// Version parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version {input}: {component}")]
    InvalidNumber { input: String, component: String },
}

impl VersionKey {
    /// The version string exactly as it was parsed
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric components in order
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Consume the key and return the original string
    pub fn into_string(self) -> String {
        self.raw
    }
}

impl FromStr for VersionKey {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: s.to_string(),
            });
        }

        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| VersionError::InvalidNumber {
                    input: s.to_string(),
                    component: part.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: s.to_string(),
            components,
        })
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for VersionKey {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for VersionKey {}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lexicographic Vec ordering: a strict prefix sorts lower.
        self.components.cmp(&other.components)
    }
}

impl From<VersionError> for HuskError {
    fn from(err: VersionError) -> Self {
        let version = match err {
            VersionError::InvalidFormat { input } => input,
            VersionError::InvalidNumber { input, .. } => input,
        };
        HuskError::UnsupportedVersion { version }
    }
}

/// Compare two version strings
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let a: VersionKey = a.parse()?;
    let b: VersionKey = b.parse()?;
    Ok(a.cmp(&b))
}

/// Sort version strings from highest to lowest
pub fn sort_descending<S: AsRef<str>>(versions: &[S]) -> Result<Vec<String>, VersionError> {
    let mut keys = versions
        .iter()
        .map(|v| v.as_ref().parse::<VersionKey>())
        .collect::<Result<Vec<_>, _>>()?;
    keys.sort_by(|a, b| b.cmp(a));
    Ok(keys.into_iter().map(VersionKey::into_string).collect())
}

/// Highest version among the given strings, `None` when empty
pub fn max_version<'a, I>(versions: I) -> Result<Option<String>, VersionError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<VersionKey> = None;
    for version in versions {
        let key: VersionKey = version.parse()?;
        best = match best {
            Some(current) if current >= key => Some(current),
            _ => Some(key),
        };
    }
    Ok(best.map(VersionKey::into_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sort_descending() {
        let sorted = sort_descending(&["1", "1.1", "1.1.1", "1.2.1", "1.3.0"]).unwrap();
        assert_eq!(sorted, vec!["1.3.0", "1.2.1", "1.1.1", "1.1", "1"]);
    }

    #[test]
    fn test_more_components_sort_higher() {
        assert_eq!(compare_versions("1.0", "1.0.0").unwrap(), Ordering::Less);
        assert_eq!(compare_versions("2", "1.9.9").unwrap(), Ordering::Greater);
        assert_eq!(compare_versions("1.10.0", "1.9.0").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_max_version() {
        let max = max_version(["1.0.0", "1.0.10", "1.0.2"]).unwrap();
        assert_eq!(max.as_deref(), Some("1.0.10"));
        assert_eq!(max_version(std::iter::empty()).unwrap(), None);
    }

    #[test]
    fn test_prerelease_is_unsupported() {
        let err = "1.0.0-rc1".parse::<VersionKey>().unwrap_err();
        assert!(matches!(err, VersionError::InvalidNumber { ref component, .. } if component == "0-rc1"));

        let husk: HuskError = err.into();
        assert!(matches!(husk, HuskError::UnsupportedVersion { ref version } if version == "1.0.0-rc1"));
    }

    #[test]
    fn test_empty_version_is_invalid() {
        assert!(matches!(
            "".parse::<VersionKey>(),
            Err(VersionError::InvalidFormat { .. })
        ));
    }

    proptest! {
        #[test]
        fn ordering_is_antisymmetric(
            a in prop::collection::vec(0u64..50, 1..5),
            b in prop::collection::vec(0u64..50, 1..5),
        ) {
            let a = a.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(".");
            let b = b.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(".");
            let ab = compare_versions(&a, &b).unwrap();
            let ba = compare_versions(&b, &a).unwrap();
            prop_assert_eq!(ab, ba.reverse());
        }
    }
}
