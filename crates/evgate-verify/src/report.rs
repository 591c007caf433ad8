//! # Verification Reports
//!
//! Verification failures are data, not errors. Every check appends a
//! [`VerificationFailure`] and keeps going; the caller gets one
//! [`VerificationResult`] listing everything that is wrong.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Overall outcome of a verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Pass,
    Fail,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Pass => f.write_str("PASS"),
            OverallStatus::Fail => f.write_str("FAIL"),
        }
    }
}

/// The rule a failure violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// A manifest could not be read or parsed.
    MalformedManifest,
    /// `files` is not strictly ascending by `path`.
    ManifestOrderingViolation,
    /// The manifest sits under a `<category>/<sha>` that differs from its
    /// own `category`/`sha` fields.
    ManifestLocationMismatch,
    /// An expected policy hash is absent from, or different in, the manifest.
    PolicyHashMismatch,
    /// `cas` is not the path derived from `sha256`.
    CasLinkageMismatch,
    /// No blob at the entry's CAS path.
    MissingBlob,
    /// The blob exists but could not be read.
    UnreadableBlob,
    /// Blob content hashes to something other than the recorded digest.
    DigestMismatch,
    /// Blob length differs from the recorded size.
    SizeMismatch,
    /// A blob sits under `<aa>/<bb>` directories that do not match its name.
    MisplacedBlob,
    /// A file in the CAS that follows no known naming scheme.
    UnexpectedCasEntry,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One detected problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub kind: FailureKind,
    /// Manifest file the failure was found in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    /// Logical file path, policy name, or store-relative path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl VerificationFailure {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            manifest: None,
            path: None,
            digest: None,
            expected: None,
            actual: None,
        }
    }

    pub fn manifest(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(m) = &self.manifest {
            write!(f, " manifest={}", m.display())?;
        }
        if let Some(p) = &self.path {
            write!(f, " path={p}")?;
        }
        if let Some(d) = &self.digest {
            write!(f, " digest={d}")?;
        }
        if let Some(e) = &self.expected {
            write!(f, " expected={e}")?;
        }
        if let Some(a) = &self.actual {
            write!(f, " actual={a}")?;
        }
        Ok(())
    }
}

/// Outcome of verifying one or more manifests, or the whole CAS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub overall_status: OverallStatus,
    pub failures: Vec<VerificationFailure>,
    /// Manifests examined, including malformed ones.
    #[serde(default)]
    pub manifests_checked: usize,
    /// Blobs whose content was re-hashed.
    #[serde(default)]
    pub blobs_checked: usize,
}

impl VerificationResult {
    /// A passing result with no work recorded.
    pub fn pass() -> Self {
        Self {
            overall_status: OverallStatus::Pass,
            failures: Vec::new(),
            manifests_checked: 0,
            blobs_checked: 0,
        }
    }

    /// Status derived from whether `failures` is empty.
    pub fn from_failures(failures: Vec<VerificationFailure>) -> Self {
        let mut result = Self::pass();
        result.failures = failures;
        result.refresh_status();
        result
    }

    pub fn is_pass(&self) -> bool {
        self.overall_status == OverallStatus::Pass
    }

    /// Failures of one kind, in report order.
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &VerificationFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: VerificationResult) {
        self.failures.extend(other.failures);
        self.manifests_checked += other.manifests_checked;
        self.blobs_checked += other.blobs_checked;
        self.refresh_status();
    }

    pub(crate) fn push(&mut self, failure: VerificationFailure) {
        self.failures.push(failure);
        self.overall_status = OverallStatus::Fail;
    }

    fn refresh_status(&mut self) {
        self.overall_status = if self.failures.is_empty() {
            OverallStatus::Pass
        } else {
            OverallStatus::Fail
        };
    }
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self::pass()
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} manifests, {} blobs, {} failures)",
            self.overall_status,
            self.manifests_checked,
            self.blobs_checked,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}
