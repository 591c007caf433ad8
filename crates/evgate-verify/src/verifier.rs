//! # Verifier
//!
//! Re-derives every digest a manifest claims and checks it against the CAS,
//! and sweeps the CAS for blobs whose content no longer matches their name.
//!
//! Per manifest, in order:
//!
//! 1. Parse. A manifest that does not parse is an error for
//!    [`Verifier::verify_manifest`] and a `MalformedManifest` failure for
//!    [`Verifier::verify_all`], as is a directory the discovery walk cannot
//!    read.
//! 2. `files` strictly ascending by path (`ManifestOrderingViolation`).
//! 3. Location under the artifacts root agrees with `category`/`sha`
//!    (`ManifestLocationMismatch`).
//! 4. Expected policy hashes, when supplied (`PolicyHashMismatch`).
//! 5. Per entry: `CasLinkageMismatch`, then `MissingBlob`, then
//!    `DigestMismatch` and `SizeMismatch` against the blob bytes.
//!
//! Nothing short-circuits and nothing is repaired. The verifier never
//! writes to the artifacts tree.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use evgate_cas::{cas_relative_path, CasEntry, ContentAddressedStore};
use evgate_core::sha256_blob;
use evgate_manifest::{ArtifactLayout, ManifestError, RunManifest};
use tracing::{debug, info, warn};

use crate::error::VerifyError;
use crate::report::{FailureKind, VerificationFailure, VerificationResult};

/// Expected policy name → digest pairs.
pub type PolicyExpectations = BTreeMap<String, String>;

/// Read-only checker over one artifacts tree.
#[derive(Debug, Clone)]
pub struct Verifier {
    layout: ArtifactLayout,
    store: ContentAddressedStore,
}

impl Verifier {
    /// Verifier over `layout`, reading blobs from `layout.cas_root()`.
    pub fn new(layout: ArtifactLayout) -> Self {
        let store = layout.store();
        Self { layout, store }
    }

    /// Verifier reading blobs from an explicitly supplied store.
    pub fn with_store(layout: ArtifactLayout, store: ContentAddressedStore) -> Self {
        Self { layout, store }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Verify one manifest file.
    pub fn verify_manifest(&self, path: &Path) -> Result<VerificationResult, VerifyError> {
        self.verify_manifest_with_policies(path, &PolicyExpectations::new())
    }

    /// Verify one manifest file, also requiring each expected policy hash.
    pub fn verify_manifest_with_policies(
        &self,
        path: &Path,
        expected: &PolicyExpectations,
    ) -> Result<VerificationResult, VerifyError> {
        let manifest = RunManifest::load(path)?;
        let result = self.check(&manifest, path, expected);
        log_outcome(path, &result);
        Ok(result)
    }

    /// Verify every manifest under the artifacts root.
    pub fn verify_all(&self) -> VerificationResult {
        self.verify_all_with_policies(&PolicyExpectations::new())
    }

    /// [`verify_all`](Self::verify_all) with expected policy hashes applied
    /// to every manifest.
    pub fn verify_all_with_policies(&self, expected: &PolicyExpectations) -> VerificationResult {
        let found = self
            .layout
            .discover_manifests()
            .map(|r| r.map_err(ManifestError::from));
        let total = self.verify_discovered(found, expected);
        info!(
            status = %total.overall_status,
            manifests = total.manifests_checked,
            failures = total.failures.len(),
            "verified all manifests"
        );
        total
    }

    /// Verify each discovered manifest. Discovery errors and manifests that
    /// do not load become `MalformedManifest` failures; the pass continues.
    fn verify_discovered(
        &self,
        found: impl IntoIterator<Item = Result<PathBuf, ManifestError>>,
        expected: &PolicyExpectations,
    ) -> VerificationResult {
        let mut total = VerificationResult::pass();
        for item in found {
            let path = match item {
                Ok(path) => path,
                Err(e) => {
                    let at = discovery_path(&e);
                    warn!(path = ?at, error = %e, "manifest discovery error");
                    let failure = VerificationFailure::new(FailureKind::MalformedManifest)
                        .actual(e.to_string());
                    total.push(match at {
                        Some(at) => failure.manifest(at),
                        None => failure,
                    });
                    continue;
                }
            };
            match RunManifest::load(&path) {
                Ok(manifest) => {
                    let result = self.check(&manifest, &path, expected);
                    log_outcome(&path, &result);
                    total.merge(result);
                }
                Err(e) => {
                    let reason = match e {
                        ManifestError::Malformed { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    warn!(manifest = %path.display(), %reason, "malformed manifest");
                    total.manifests_checked += 1;
                    total.push(
                        VerificationFailure::new(FailureKind::MalformedManifest)
                            .manifest(&path)
                            .actual(reason),
                    );
                }
            }
        }
        total
    }

    /// Check an already-parsed manifest. `source` is where it was read from.
    pub fn check(
        &self,
        manifest: &RunManifest,
        source: &Path,
        expected: &PolicyExpectations,
    ) -> VerificationResult {
        let mut result = VerificationResult::pass();
        result.manifests_checked = 1;
        let fail = |kind| VerificationFailure::new(kind).manifest(source);

        for pair in manifest.files.windows(2) {
            let (prev, cur) = (&pair[0].path, &pair[1].path);
            if prev == cur {
                result.push(
                    fail(FailureKind::ManifestOrderingViolation)
                        .path(cur.as_str())
                        .expected("unique paths")
                        .actual("duplicate path"),
                );
            } else if prev > cur {
                result.push(
                    fail(FailureKind::ManifestOrderingViolation)
                        .path(cur.as_str())
                        .expected(format!("after {prev}"))
                        .actual(format!("before {prev}")),
                );
            }
        }

        if let Some((category, sha)) = self.layout.locate(source) {
            if category != manifest.category.as_str() || sha != manifest.sha.as_str() {
                result.push(
                    fail(FailureKind::ManifestLocationMismatch)
                        .expected(format!("{}/{}", manifest.category, manifest.sha))
                        .actual(format!("{category}/{sha}")),
                );
            }
        }

        for (name, want) in expected {
            let got = manifest.policy_hashes.get(name);
            if got != Some(want) {
                result.push(
                    fail(FailureKind::PolicyHashMismatch)
                        .path(name.as_str())
                        .expected(want.as_str())
                        .actual(got.map_or("<absent>", String::as_str)),
                );
            }
        }

        for entry in &manifest.files {
            let path = entry.path.as_str();
            match entry.expected_cas() {
                Some(want) if want != entry.cas => result.push(
                    fail(FailureKind::CasLinkageMismatch)
                        .path(path)
                        .digest(entry.sha256.as_str())
                        .expected(want)
                        .actual(entry.cas.as_str()),
                ),
                Some(_) => {}
                None => result.push(
                    fail(FailureKind::CasLinkageMismatch)
                        .path(path)
                        .digest(entry.sha256.as_str())
                        .expected("sha256 of 64 lowercase hex characters")
                        .actual(entry.sha256.as_str()),
                ),
            }

            // Follow the recorded pointer when it is well-formed, otherwise
            // the path the digest implies.
            let Some(target) = entry.cas_digest().or_else(|| entry.digest()) else {
                continue;
            };
            let blob_path = self.store.blob_path(&target);
            let bytes = match fs::read(&blob_path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    result.push(
                        fail(FailureKind::MissingBlob)
                            .path(path)
                            .digest(entry.sha256.as_str())
                            .expected(cas_relative_path(&target)),
                    );
                    continue;
                }
                Err(e) => {
                    result.push(
                        fail(FailureKind::UnreadableBlob)
                            .path(path)
                            .digest(entry.sha256.as_str())
                            .actual(e.to_string()),
                    );
                    continue;
                }
            };
            result.blobs_checked += 1;

            let actual = sha256_blob(&bytes).to_hex();
            if actual != entry.sha256 {
                result.push(
                    fail(FailureKind::DigestMismatch)
                        .path(path)
                        .digest(entry.sha256.as_str())
                        .expected(entry.sha256.as_str())
                        .actual(actual),
                );
            }
            let size = bytes.len() as u64;
            if size != entry.size {
                result.push(
                    fail(FailureKind::SizeMismatch)
                        .path(path)
                        .digest(entry.sha256.as_str())
                        .expected(entry.size.to_string())
                        .actual(size.to_string()),
                );
            }
        }

        for failure in &result.failures {
            warn!(%failure, "verification failure");
        }
        result
    }

    /// Re-hash every blob in the CAS against its file name.
    ///
    /// Walks the store lazily. Orphaned temp files and metadata sidecars
    /// are ignored; anything else that is not a blob is reported.
    pub fn verify_cas_integrity(&self) -> VerificationResult {
        let mut result = VerificationResult::pass();
        let root = self.store.root();
        let rel = |p: &Path| {
            p.strip_prefix(root)
                .unwrap_or(p)
                .to_string_lossy()
                .replace('\\', "/")
        };

        for entry in self.store.entries() {
            let loc = match entry {
                Ok(CasEntry::Blob(loc)) => loc,
                Ok(CasEntry::Meta(_)) => continue,
                Ok(CasEntry::Partial(p)) => {
                    debug!(path = %p.display(), "ignoring orphaned temp file");
                    continue;
                }
                Ok(CasEntry::Unexpected(p)) => {
                    result.push(
                        VerificationFailure::new(FailureKind::UnexpectedCasEntry).path(rel(&p)),
                    );
                    continue;
                }
                Err(e) => {
                    result.push(
                        VerificationFailure::new(FailureKind::UnreadableBlob).actual(e.to_string()),
                    );
                    continue;
                }
            };

            let hex = loc.digest.to_hex();
            if !loc.prefix_ok {
                result.push(
                    VerificationFailure::new(FailureKind::MisplacedBlob)
                        .path(loc.relative.as_str())
                        .digest(hex.as_str())
                        .expected(cas_relative_path(&loc.digest))
                        .actual(loc.relative.as_str()),
                );
            }
            match fs::read(&loc.path) {
                Ok(bytes) => {
                    result.blobs_checked += 1;
                    let actual = sha256_blob(&bytes);
                    if actual != loc.digest {
                        result.push(
                            VerificationFailure::new(FailureKind::DigestMismatch)
                                .path(loc.relative.as_str())
                                .digest(hex.as_str())
                                .expected(hex.as_str())
                                .actual(actual.to_hex()),
                        );
                    }
                }
                Err(e) => result.push(
                    VerificationFailure::new(FailureKind::UnreadableBlob)
                        .path(loc.relative.as_str())
                        .digest(hex.as_str())
                        .actual(e.to_string()),
                ),
            }
        }

        for failure in &result.failures {
            warn!(%failure, "CAS integrity failure");
        }
        info!(
            status = %result.overall_status,
            blobs = result.blobs_checked,
            failures = result.failures.len(),
            "verified CAS integrity"
        );
        result
    }
}

fn log_outcome(path: &Path, result: &VerificationResult) {
    info!(
        manifest = %path.display(),
        status = %result.overall_status,
        blobs = result.blobs_checked,
        failures = result.failures.len(),
        "verified manifest"
    );
}

/// Where a discovery error happened, when the error says.
fn discovery_path(err: &ManifestError) -> Option<PathBuf> {
    match err {
        ManifestError::Walk(e) => e.path().map(Path::to_path_buf),
        ManifestError::Io { path, .. } => Some(path.clone()),
        _ => None,
    }
}
