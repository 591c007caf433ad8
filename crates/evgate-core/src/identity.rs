//! # Run Identifiers
//!
//! Validated newtypes for the three strings a caller hands the engine:
//! the run category, the commit sha, and each file's logical path.
//! Categories and shas become directory names under `artifacts/`, so
//! validation here is what keeps a manifest write inside its run directory.

use serde::{Deserialize, Serialize};

use crate::error::EvgateError;

/// Maximum length of a single category segment.
const MAX_SEGMENT_LEN: usize = 64;

/// Maximum length of a run sha.
const MAX_SHA_LEN: usize = 128;

/// Category names reserved by the artifacts layout.
const RESERVED_CATEGORIES: &[&str] = &["cas"];

fn invalid(kind: &'static str, reason: String) -> EvgateError {
    EvgateError::InvalidIdentifier { kind, reason }
}

/// A run category such as `evidence`, `ga-verify`, or `governance/sbom`.
///
/// One or more `/`-separated segments, each matching
/// `^[a-z0-9][a-z0-9._-]{0,63}$`. The first segment may not be a reserved
/// layout name (`cas`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunCategory(String);

impl RunCategory {
    /// Validate and wrap a category string.
    pub fn new(s: &str) -> Result<Self, EvgateError> {
        if s.is_empty() {
            return Err(invalid("category", "category is required".into()));
        }
        for segment in s.split('/') {
            validate_category_segment(segment)?;
        }
        let first = s.split('/').next().unwrap_or_default();
        if RESERVED_CATEGORIES.contains(&first) {
            return Err(invalid(
                "category",
                format!("{first:?} is reserved by the artifacts layout"),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Return the category as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

fn validate_category_segment(segment: &str) -> Result<(), EvgateError> {
    if segment.is_empty() {
        return Err(invalid("category", "empty segment".into()));
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(invalid(
            "category",
            format!("segment too long: {} chars (max {MAX_SEGMENT_LEN})", segment.len()),
        ));
    }
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => {
            return Err(invalid(
                "category",
                format!("segment must start with [a-z0-9], got: {segment:?}"),
            ));
        }
    }
    for c in chars {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')) {
            return Err(invalid(
                "category",
                format!("segment {segment:?} contains invalid character {c:?}"),
            ));
        }
    }
    Ok(())
}

impl TryFrom<String> for RunCategory {
    type Error = EvgateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<RunCategory> for String {
    fn from(value: RunCategory) -> Self {
        value.0
    }
}

impl std::fmt::Display for RunCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A source-control commit identifier, used as one directory segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunSha(String);

impl RunSha {
    /// Validate and wrap a run sha.
    ///
    /// Non-empty, at most 128 chars of `[A-Za-z0-9._-]`, and not `.` or `..`.
    pub fn new(s: &str) -> Result<Self, EvgateError> {
        if s.is_empty() {
            return Err(invalid("sha", "sha is required".into()));
        }
        if s.len() > MAX_SHA_LEN {
            return Err(invalid(
                "sha",
                format!("too long: {} chars (max {MAX_SHA_LEN})", s.len()),
            ));
        }
        if s == "." || s == ".." {
            return Err(invalid("sha", format!("{s:?} is not a valid sha")));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(invalid("sha", format!("{s:?} contains invalid character {c:?}")));
        }
        Ok(Self(s.to_string()))
    }

    /// Return the sha as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RunSha {
    type Error = EvgateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<RunSha> for String {
    fn from(value: RunSha) -> Self {
        value.0
    }
}

impl std::fmt::Display for RunSha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The run-scoped name of one evidence file, e.g. `sbom/app.cdx.json`.
///
/// Relative, `/`-separated, with no empty, `.` or `..` segments, no
/// backslashes and no NUL bytes. Ordering is byte-lexicographic, which is
/// the order manifest `files` are sorted in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalPath(String);

impl LogicalPath {
    /// Validate and wrap a logical path.
    pub fn new(s: &str) -> Result<Self, EvgateError> {
        if s.is_empty() {
            return Err(invalid("path", "path is required".into()));
        }
        if s.starts_with('/') {
            return Err(invalid("path", format!("{s:?} must be relative")));
        }
        if s.contains('\\') || s.contains('\0') {
            return Err(invalid(
                "path",
                format!("{s:?} contains a backslash or NUL byte"),
            ));
        }
        for segment in s.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(invalid(
                    "path",
                    format!("{s:?} contains an empty, \".\" or \"..\" segment"),
                ));
            }
        }
        Ok(Self(s.to_string()))
    }

    /// Return the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = EvgateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<LogicalPath> for String {
    fn from(value: LogicalPath) -> Self {
        value.0
    }
}

impl std::fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_accepts_known_shapes() {
        for ok in ["evidence", "ga-verify", "governance/sbom", "governance/policy.v2"] {
            assert_eq!(RunCategory::new(ok).unwrap().as_str(), ok);
        }
    }

    #[test]
    fn category_rejects_bad_shapes() {
        for bad in [
            "", "Evidence", "evidence/", "/evidence", "governance//x", "-lead",
            "governance/..", "a b", "cas", "cas/extra",
        ] {
            assert!(RunCategory::new(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(RunCategory::new(&"a".repeat(65)).is_err());
    }

    #[test]
    fn category_segments() {
        let c = RunCategory::new("governance/sbom").unwrap();
        assert_eq!(c.segments().collect::<Vec<_>>(), vec!["governance", "sbom"]);
    }

    #[test]
    fn sha_validation() {
        assert!(RunSha::new("deadbeef").is_ok());
        assert!(RunSha::new("v1.2.3-rc_1").is_ok());
        assert!(RunSha::new("").is_err());
        assert!(RunSha::new("..").is_err());
        assert!(RunSha::new("a/b").is_err());
        assert!(RunSha::new(&"a".repeat(129)).is_err());
    }

    #[test]
    fn logical_path_validation() {
        assert!(LogicalPath::new("logs/b.txt").is_ok());
        assert!(LogicalPath::new("sbom/a.json").is_ok());
        for bad in ["", "/abs", "a//b", "a/./b", "../x", "a\\b", "dir/"] {
            assert!(LogicalPath::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn logical_path_orders_bytewise() {
        let a = LogicalPath::new("logs/b.txt").unwrap();
        let b = LogicalPath::new("sbom/a.json").unwrap();
        assert!(a < b);
    }

    #[test]
    fn serde_rejects_invalid_values() {
        assert!(serde_json::from_str::<RunCategory>("\"cas\"").is_err());
        let c: RunCategory = serde_json::from_str("\"evidence\"").unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"evidence\"");
    }
}
