//! # Run Manifest Builder
//!
//! Ingests a caller-supplied set of evidence files into the CAS and writes
//! the run's `run-manifest.json`.
//!
//! Construction is fail-fast: duplicate logical paths are rejected before
//! anything is written, and the first read or CAS error aborts the build.
//! Blobs stored before the failure stay in the CAS, which is harmless since
//! CAS writes are idempotent and retrying the build reuses them.
//!
//! ## Overwrites
//!
//! The manifest is not content-addressed. Rebuilding the same
//! `category`/`sha` replaces the previous file. If the replaced manifest
//! had different content (ignoring `created_at`) a warning is logged, since
//! identical inputs are expected to produce identical manifests. Two
//! concurrent builds of the same run race with last-writer-wins.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use evgate_cas::{AtomicWriter, ContentAddressedStore};
use evgate_core::{EvgateError, LogicalPath, RunCategory, RunSha, Timestamp};
use tracing::{debug, info, warn};

use crate::error::ManifestError;
use crate::layout::ArtifactLayout;
use crate::manifest::{FileEntry, RunManifest, SchemaVersion};

/// Where an input's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A local file, read at build time.
    File(PathBuf),
    /// Bytes already in memory.
    Bytes(Vec<u8>),
}

/// One file of a run: its logical name and its content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInput {
    pub logical: LogicalPath,
    pub source: InputSource,
}

impl RunInput {
    pub fn file(logical: LogicalPath, local: impl Into<PathBuf>) -> Self {
        Self {
            logical,
            source: InputSource::File(local.into()),
        }
    }

    pub fn bytes(logical: LogicalPath, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            logical,
            source: InputSource::Bytes(bytes.into()),
        }
    }

    fn read(&self) -> Result<Cow<'_, [u8]>, ManifestError> {
        match &self.source {
            InputSource::File(p) => std::fs::read(p)
                .map(Cow::Owned)
                .map_err(|e| ManifestError::io(p, e)),
            InputSource::Bytes(b) => Ok(Cow::Borrowed(b)),
        }
    }
}

/// Builds one run's manifest.
#[derive(Debug)]
pub struct RunManifestBuilder {
    layout: ArtifactLayout,
    store: ContentAddressedStore,
    writer: Arc<dyn AtomicWriter>,
    category: RunCategory,
    sha: RunSha,
    inputs: Vec<RunInput>,
    tool_versions: BTreeMap<String, String>,
    policy_hashes: BTreeMap<String, String>,
    created_at: Option<Timestamp>,
}

impl RunManifestBuilder {
    /// Start a build for `category`/`sha`. Blobs go to `store`; the
    /// manifest is written under `layout` with the store's writer.
    pub fn new(
        layout: ArtifactLayout,
        store: ContentAddressedStore,
        category: RunCategory,
        sha: RunSha,
    ) -> Self {
        let writer = store.writer();
        Self {
            layout,
            store,
            writer,
            category,
            sha,
            inputs: Vec::new(),
            tool_versions: BTreeMap::new(),
            policy_hashes: BTreeMap::new(),
            created_at: None,
        }
    }

    /// Add a local file under a logical name.
    pub fn file(self, logical: LogicalPath, local: impl Into<PathBuf>) -> Self {
        self.input(RunInput::file(logical, local))
    }

    /// Add in-memory content under a logical name.
    pub fn bytes(self, logical: LogicalPath, bytes: impl Into<Vec<u8>>) -> Self {
        self.input(RunInput::bytes(logical, bytes))
    }

    pub fn input(mut self, input: RunInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add every regular file under `dir`, named by its `/`-joined path
    /// relative to `dir`. Symlinks are not followed.
    pub fn dir(mut self, dir: &Path) -> Result<Self, ManifestError> {
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let logical = rel
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| non_utf8_path(entry.path()))?
                .join("/");
            let logical = LogicalPath::new(&logical)?;
            self.inputs.push(RunInput::file(logical, entry.into_path()));
        }
        Ok(self)
    }

    pub fn tool_version(mut self, tool: impl Into<String>, version: impl Into<String>) -> Self {
        self.tool_versions.insert(tool.into(), version.into());
        self
    }

    pub fn policy_hash(mut self, name: impl Into<String>, digest: impl Into<String>) -> Self {
        self.policy_hashes.insert(name.into(), digest.into());
        self
    }

    /// Override `created_at` (defaults to the build time).
    pub fn created_at(mut self, at: Timestamp) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Where the manifest will be written.
    pub fn manifest_path(&self) -> PathBuf {
        self.layout.manifest_path(&self.category, &self.sha)
    }

    /// Ingest every input, then write and return the manifest.
    ///
    /// # Errors
    ///
    /// - `ManifestError::DuplicatePath` if two inputs share a logical path.
    ///   Nothing is written in that case.
    /// - `ManifestError::Io` if an input cannot be read or the manifest
    ///   cannot be written.
    /// - `ManifestError::Cas` if a blob cannot be stored.
    pub fn build(self) -> Result<RunManifest, ManifestError> {
        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(&input.logical) {
                return Err(ManifestError::DuplicatePath {
                    path: input.logical.clone(),
                });
            }
        }

        let mut files = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let bytes = input.read()?;
            let stored = self.store.store(&bytes)?;
            debug!(
                path = %input.logical,
                digest = %stored.digest,
                size = stored.size,
                "ingested file"
            );
            files.push(FileEntry::new(input.logical.clone(), stored.digest, stored.size));
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let manifest = RunManifest {
            schema_version: SchemaVersion::CURRENT,
            category: self.category.clone(),
            sha: self.sha.clone(),
            created_at: Some(self.created_at.unwrap_or_else(Timestamp::now)),
            files,
            tool_versions: self.tool_versions.clone(),
            policy_hashes: self.policy_hashes.clone(),
        };

        let path = self.manifest_path();
        self.check_overwrite(&path, &manifest)?;
        let bytes = manifest.to_json_bytes()?;
        self.writer
            .write_atomic(&path, &bytes)
            .map_err(|e| ManifestError::io(&path, e))?;
        info!(
            category = %manifest.category,
            sha = %manifest.sha,
            files = manifest.files.len(),
            path = %path.display(),
            "wrote run manifest"
        );
        Ok(manifest)
    }

    fn check_overwrite(&self, path: &Path, manifest: &RunManifest) -> Result<(), ManifestError> {
        if !path.exists() {
            return Ok(());
        }
        let previous = match RunManifest::load(path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "replacing unreadable run manifest");
                return Ok(());
            }
        };
        let (old, new) = (previous.content_digest()?, manifest.content_digest()?);
        if old == new {
            debug!(path = %path.display(), "rebuilt run manifest is unchanged");
        } else {
            warn!(
                path = %path.display(),
                previous = %old,
                current = %new,
                "rebuild of the same run produced a different manifest"
            );
        }
        Ok(())
    }
}

fn non_utf8_path(path: &Path) -> ManifestError {
    EvgateError::InvalidIdentifier {
        kind: "path",
        reason: format!("{} is not valid UTF-8", path.display()),
    }
    .into()
}
