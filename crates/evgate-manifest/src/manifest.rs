//! # Run Manifest Schema
//!
//! The deterministic index of one run (one category, one commit), stored at
//! `artifacts/<category>/<sha>/run-manifest.json`.
//!
//! ## Field types
//!
//! `category`, `sha` and each file's `path` are validated identifiers: a
//! manifest carrying an unsafe one does not parse. Each file's `sha256`,
//! `size` and `cas` are kept as raw values so a manifest with a bad digest or
//! a broken CAS pointer still loads, and the verifier can report exactly what
//! is wrong with it.
//!
//! ## Schema versions
//!
//! `schema_version` is a tagged [`SchemaVersion`]. A value this build does
//! not know makes the manifest malformed instead of being guessed at.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use evgate_cas::{cas_relative_path, parse_cas_relative_path};
use evgate_core::{
    canonical_hash, ContentDigest, LogicalPath, RunCategory, RunSha, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Manifest schema versions understood by this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// `"1"`: the initial schema.
    #[serde(rename = "1")]
    V1,
}

impl SchemaVersion {
    /// The version new manifests are written with.
    pub const CURRENT: SchemaVersion = SchemaVersion::V1;

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1 => "1",
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evidence file within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Run-scoped logical name, unique within the manifest.
    pub path: LogicalPath,
    /// Lowercase hex SHA-256 of the file content.
    pub sha256: String,
    /// Content length in bytes.
    pub size: u64,
    /// Store-relative blob path, `sha256/<aa>/<bb>/<digest>.blob`.
    pub cas: String,
}

impl FileEntry {
    /// Entry for content with `digest` and `size`, pointing at its CAS blob.
    pub fn new(path: LogicalPath, digest: ContentDigest, size: u64) -> Self {
        Self {
            path,
            sha256: digest.to_hex(),
            size,
            cas: cas_relative_path(&digest),
        }
    }

    /// The recorded digest, if it is 64 lowercase hex characters.
    pub fn digest(&self) -> Option<ContentDigest> {
        if !ContentDigest::is_canonical_hex(&self.sha256) {
            return None;
        }
        ContentDigest::from_hex(&self.sha256).ok()
    }

    /// The CAS pointer the `sha256` field implies, if that field is valid.
    pub fn expected_cas(&self) -> Option<String> {
        self.digest().map(|d| cas_relative_path(&d))
    }

    /// The digest encoded in the `cas` pointer, if it is well-formed.
    pub fn cas_digest(&self) -> Option<ContentDigest> {
        parse_cas_relative_path(&self.cas)
    }
}

/// The index of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: SchemaVersion,
    pub category: RunCategory,
    pub sha: RunSha,
    /// Informational; excluded from [`content_digest()`](Self::content_digest).
    /// Explicit offsets are accepted on read and normalized to UTC.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "evgate_core::temporal::lenient_option"
    )]
    pub created_at: Option<Timestamp>,
    /// Sorted by `path`, no duplicates.
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub tool_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub policy_hashes: BTreeMap<String, String>,
}

impl RunManifest {
    /// Parse manifest JSON. `source` only labels errors.
    pub fn parse(bytes: &[u8], source: &Path) -> Result<Self, ManifestError> {
        serde_json::from_slice(bytes).map_err(|e| ManifestError::Malformed {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path).map_err(|e| ManifestError::io(path, e))?;
        Self::parse(&bytes, path)
    }

    /// The bytes written to disk: pretty JSON plus a trailing newline.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Canonical SHA-256 of the manifest with `created_at` removed.
    ///
    /// Two builds of the same inputs have equal content digests even though
    /// their files differ in `created_at`.
    pub fn content_digest(&self) -> Result<ContentDigest, ManifestError> {
        let mut stripped = self.clone();
        stripped.created_at = None;
        Ok(canonical_hash(&stripped)?)
    }

    /// Whether `files` is strictly ascending by path.
    pub fn is_sorted(&self) -> bool {
        self.files.windows(2).all(|w| w[0].path < w[1].path)
    }

    /// Every digest this manifest refers to, through either its `sha256`
    /// fields or its `cas` pointers.
    pub fn referenced_digests(&self) -> BTreeSet<ContentDigest> {
        self.files
            .iter()
            .flat_map(|f| [f.digest(), f.cas_digest()])
            .flatten()
            .collect()
    }
}
