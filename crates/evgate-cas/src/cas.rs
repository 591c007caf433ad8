//! # Content-Addressed Storage (CAS)
//!
//! Append-only blob storage keyed by SHA-256. A blob's location is a pure
//! function of its digest:
//!
//! ```text
//! <root>/sha256/<aa>/<bb>/<digest>.blob
//! <root>/sha256/<aa>/<bb>/<digest>.meta.json   (optional, informational)
//! ```
//!
//! where `aa`/`bb` are the first and second pairs of hex characters.
//!
//! ## Integrity Invariant
//!
//! Bytes at a digest path hash to that digest, and never change once
//! written. [`put()`](ContentAddressedStore::put) is idempotent: an existing
//! blob is not rewritten. New blobs go through the [`AtomicWriter`], so a
//! crash leaves at most an orphaned temp file, never a partial blob.
//!
//! `get()` trusts the path; [`get_verified()`](ContentAddressedStore::get_verified)
//! re-hashes. Store-wide verification lives in the verifier, which consumes
//! the lazy [`entries()`](ContentAddressedStore::entries) sweep.
//!
//! ## Concurrency
//!
//! Writers of the same digest race harmlessly: both stage identical bytes
//! and the final rename is atomic. Writers of different digests share
//! nothing. Readers racing a writer see the blob as absent, never partial.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use evgate_core::{sha256_blob, ContentDigest, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::atomic::{is_temp_file_name, AtomicWriter, FsyncRenameWriter};
use crate::error::CasError;

/// Top-level directory for SHA-256 addressed blobs inside the store root.
pub const SHA256_DIR: &str = "sha256";

/// File extension of blob files.
pub const BLOB_EXTENSION: &str = "blob";

/// Suffix of blob metadata sidecars.
pub const META_SUFFIX: &str = ".meta.json";

/// Temp files younger than this may belong to a write still in progress.
pub const DEFAULT_PARTIAL_MIN_AGE: Duration = Duration::from_secs(60 * 60);

/// Store-relative path of a blob: `sha256/<aa>/<bb>/<digest>.blob`.
///
/// This is the exact string recorded in manifest `cas` pointers.
pub fn cas_relative_path(digest: &ContentDigest) -> String {
    let hex = digest.to_hex();
    format!("{SHA256_DIR}/{}/{}/{hex}.{BLOB_EXTENSION}", &hex[0..2], &hex[2..4])
}

/// Parse a store-relative blob path back into its digest.
///
/// Returns `None` unless `s` is exactly the string
/// [`cas_relative_path()`] would produce for some digest.
pub fn parse_cas_relative_path(s: &str) -> Option<ContentDigest> {
    let mut parts = s.split('/');
    let (root, aa, bb, file, rest) = (
        parts.next()?,
        parts.next()?,
        parts.next()?,
        parts.next()?,
        parts.next(),
    );
    if root != SHA256_DIR || rest.is_some() {
        return None;
    }
    let hex = file.strip_suffix(&format!(".{BLOB_EXTENSION}"))?;
    if !ContentDigest::is_canonical_hex(hex) || aa != &hex[0..2] || bb != &hex[2..4] {
        return None;
    }
    ContentDigest::from_hex(hex).ok()
}

/// Informational sidecar written next to a new blob.
///
/// Never consulted for integrity decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    /// Digest of the blob.
    pub digest: ContentDigest,
    /// Size of the blob in bytes.
    pub size: u64,
    /// When the blob was first written.
    pub created_at: Timestamp,
}

/// Result of a [`store()`](ContentAddressedStore::store) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// SHA-256 of the payload.
    pub digest: ContentDigest,
    /// Payload length in bytes.
    pub size: u64,
    /// False when the blob was already present and nothing was written.
    pub written: bool,
}

/// A blob file found while sweeping the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    /// Absolute (root-joined) path of the blob file.
    pub path: PathBuf,
    /// Store-relative path, `/`-separated.
    pub relative: String,
    /// Digest encoded in the file name.
    pub digest: ContentDigest,
    /// Whether the `<aa>/<bb>` directories match the file name digest.
    pub prefix_ok: bool,
}

/// One file encountered by [`entries()`](ContentAddressedStore::entries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasEntry {
    /// A `<digest>.blob` file at blob depth.
    Blob(BlobLocation),
    /// A `<digest>.meta.json` sidecar.
    Meta(PathBuf),
    /// An orphaned temp file from an interrupted write.
    Partial(PathBuf),
    /// Anything else.
    Unexpected(PathBuf),
}

/// A content-addressed blob store backed by the filesystem.
#[derive(Debug, Clone)]
pub struct ContentAddressedStore {
    root: PathBuf,
    writer: Arc<dyn AtomicWriter>,
    write_meta: bool,
}

impl ContentAddressedStore {
    /// Create a store rooted at `root` (e.g. `artifacts/cas`).
    ///
    /// The directory does not need to exist yet; it is created on the first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_writer(root, Arc::new(FsyncRenameWriter))
    }

    /// Create a store that writes through a custom [`AtomicWriter`].
    pub fn with_writer(root: impl Into<PathBuf>, writer: Arc<dyn AtomicWriter>) -> Self {
        Self {
            root: root.into(),
            writer,
            write_meta: true,
        }
    }

    /// Enable or disable `.meta.json` sidecars for new blobs.
    pub fn with_blob_meta(mut self, enabled: bool) -> Self {
        self.write_meta = enabled;
        self
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The writer used for new blobs.
    pub fn writer(&self) -> Arc<dyn AtomicWriter> {
        Arc::clone(&self.writer)
    }

    /// Absolute path of the blob for `digest`.
    pub fn blob_path(&self, digest: &ContentDigest) -> PathBuf {
        self.resolve_relative(&cas_relative_path(digest))
    }

    /// Absolute path of the metadata sidecar for `digest`.
    pub fn meta_path(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.to_hex();
        self.root
            .join(SHA256_DIR)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{hex}{META_SUFFIX}"))
    }

    /// Join a `/`-separated store-relative path onto the root.
    pub fn resolve_relative(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Store `bytes` and return their digest.
    ///
    /// Idempotent: if the blob already exists nothing is written.
    pub fn put(&self, bytes: &[u8]) -> Result<ContentDigest, CasError> {
        self.store(bytes).map(|stored| stored.digest)
    }

    /// Store `bytes`, reporting whether a new blob was written.
    ///
    /// # Errors
    ///
    /// - `CasError::Collision` if a blob already sits at the digest path with
    ///   a different size than `bytes`. Same digest with different content
    ///   means either a SHA-256 collision or a corrupted store; both are
    ///   refused rather than papered over.
    /// - `CasError::Io` on filesystem failure. Retrying is safe.
    pub fn store(&self, bytes: &[u8]) -> Result<StoredBlob, CasError> {
        let digest = sha256_blob(bytes);
        let size = bytes.len() as u64;
        let path = self.blob_path(&digest);

        match fs::metadata(&path) {
            Ok(existing) => {
                if existing.len() != size {
                    return Err(CasError::Collision {
                        digest,
                        existing_size: existing.len(),
                        payload_size: size,
                    });
                }
                debug!(%digest, size, "blob already present");
                return Ok(StoredBlob {
                    digest,
                    size,
                    written: false,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.writer.write_atomic(&path, bytes)?;
        info!(%digest, size, "stored blob");

        if self.write_meta {
            let meta = BlobMeta {
                digest,
                size,
                created_at: Timestamp::now(),
            };
            let json = serde_json::to_vec_pretty(&meta)?;
            if let Err(e) = self.writer.write_atomic(&self.meta_path(&digest), &json) {
                warn!(%digest, error = %e, "failed to write blob metadata");
            }
        }

        Ok(StoredBlob {
            digest,
            size,
            written: true,
        })
    }

    /// Read the blob for `digest` without re-hashing it.
    pub fn get(&self, digest: &ContentDigest) -> Result<Vec<u8>, CasError> {
        match fs::read(self.blob_path(digest)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CasError::NotFound { digest: *digest })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the blob for `digest` and confirm its content hashes to it.
    pub fn get_verified(&self, digest: &ContentDigest) -> Result<Vec<u8>, CasError> {
        let bytes = self.get(digest)?;
        let actual = sha256_blob(&bytes);
        if actual != *digest {
            return Err(CasError::Integrity {
                expected: *digest,
                actual,
                path: self.blob_path(digest),
            });
        }
        Ok(bytes)
    }

    /// Whether a blob file exists for `digest`. No content check.
    pub fn exists(&self, digest: &ContentDigest) -> bool {
        self.blob_path(digest).is_file()
    }

    /// Read the metadata sidecar for `digest`, if one exists.
    pub fn meta(&self, digest: &ContentDigest) -> Result<Option<BlobMeta>, CasError> {
        match fs::read(self.meta_path(digest)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lazily walk every file under `sha256/`, in file-name order.
    ///
    /// An absent store yields nothing.
    pub fn entries(&self) -> impl Iterator<Item = Result<CasEntry, CasError>> + '_ {
        let base = self.root.join(SHA256_DIR);
        let walker = base
            .is_dir()
            .then(|| walkdir::WalkDir::new(&base).min_depth(1).sort_by_file_name());
        walker
            .into_iter()
            .flatten()
            .filter_map(move |entry| match entry {
                Ok(e) if e.file_type().is_dir() => None,
                Ok(e) => Some(Ok(self.classify(e.path(), e.depth()))),
                Err(err) => Some(Err(err.into())),
            })
    }

    /// Lazily yield only blob files, skipping sidecars, temp files and
    /// unexpected entries.
    pub fn blobs(&self) -> impl Iterator<Item = Result<BlobLocation, CasError>> + '_ {
        self.entries().filter_map(|entry| match entry {
            Ok(CasEntry::Blob(loc)) => Some(Ok(loc)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    }

    fn classify(&self, path: &Path, depth: usize) -> CasEntry {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return CasEntry::Unexpected(path.to_path_buf()),
        };
        if is_temp_file_name(name) {
            return CasEntry::Partial(path.to_path_buf());
        }
        // sha256/<aa>/<bb>/<file> is depth 3 below sha256/.
        if depth != 3 {
            return CasEntry::Unexpected(path.to_path_buf());
        }
        if let Some(hex) = name.strip_suffix(META_SUFFIX) {
            if ContentDigest::is_canonical_hex(hex) {
                return CasEntry::Meta(path.to_path_buf());
            }
        }
        let hex = match name.strip_suffix(&format!(".{BLOB_EXTENSION}")) {
            Some(hex) if ContentDigest::is_canonical_hex(hex) => hex,
            _ => return CasEntry::Unexpected(path.to_path_buf()),
        };
        let digest = match ContentDigest::from_hex(hex) {
            Ok(d) => d,
            Err(_) => return CasEntry::Unexpected(path.to_path_buf()),
        };
        let bb = path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str());
        let aa = path
            .parent()
            .and_then(|p| p.parent())
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str());
        let (aa, bb) = (aa.unwrap_or_default(), bb.unwrap_or_default());
        let prefix_ok = aa == &hex[0..2] && bb == &hex[2..4];
        CasEntry::Blob(BlobLocation {
            path: path.to_path_buf(),
            relative: format!("{SHA256_DIR}/{aa}/{bb}/{name}"),
            digest,
            prefix_ok,
        })
    }

    /// Delete the blob for `digest` and its sidecar.
    ///
    /// Only the pruner calls this. Returns whether a blob was removed.
    /// Emptied prefix directories are removed on a best-effort basis.
    pub fn remove(&self, digest: &ContentDigest) -> Result<bool, CasError> {
        let path = self.blob_path(digest);
        let removed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(self.meta_path(digest)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(bb_dir) = path.parent() {
            if fs::remove_dir(bb_dir).is_ok() {
                if let Some(aa_dir) = bb_dir.parent() {
                    let _ = fs::remove_dir(aa_dir);
                }
            }
        }
        if removed {
            info!(%digest, "removed blob");
        }
        Ok(removed)
    }

    /// Remove orphaned temp files left by interrupted writes.
    ///
    /// A live writer's staged file looks identical to an orphan, so only temp
    /// files whose modification time is at least `min_age` old are removed.
    /// Returns the removed paths.
    pub fn sweep_partials(&self, min_age: Duration) -> Result<Vec<PathBuf>, CasError> {
        let partials: Vec<PathBuf> = self
            .entries()
            .filter_map(|entry| match entry {
                Ok(CasEntry::Partial(p)) => Some(Ok(p)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<Result<_, _>>()?;
        let mut removed = Vec::with_capacity(partials.len());
        for p in partials {
            match partial_age(&p) {
                Ok(age) if age >= min_age => {}
                Ok(age) => {
                    debug!(
                        path = %p.display(),
                        age_secs = age.as_secs(),
                        "temp file too recent to sweep"
                    );
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            match fs::remove_file(&p) {
                Ok(()) => {
                    debug!(path = %p.display(), "removed orphaned temp file");
                    removed.push(p);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// Time since `path` was last modified. A modification time in the future
/// counts as zero.
fn partial_age(path: &Path) -> io::Result<Duration> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::StagedFile;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn blob_count(cas: &ContentAddressedStore) -> usize {
        cas.blobs().count()
    }

    #[test]
    fn put_returns_sha256_and_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"hello").unwrap();
        assert_eq!(digest.to_hex(), HELLO_SHA256);
        assert_eq!(cas.get(&digest).unwrap(), b"hello");
        assert_eq!(cas.get_verified(&digest).unwrap(), b"hello");
    }

    #[test]
    fn blob_path_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"hello").unwrap();
        let expected = dir
            .path()
            .join("sha256")
            .join("2c")
            .join("f2")
            .join(format!("{HELLO_SHA256}.blob"));
        assert_eq!(cas.blob_path(&digest), expected);
        assert!(expected.is_file());
        assert_eq!(
            cas_relative_path(&digest),
            format!("sha256/2c/f2/{HELLO_SHA256}.blob")
        );
    }

    #[test]
    fn put_twice_leaves_exactly_one_blob() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let first = cas.store(b"evidence").unwrap();
        let second = cas.store(b"evidence").unwrap();
        assert_eq!(first.digest, second.digest);
        assert!(first.written);
        assert!(!second.written);
        assert_eq!(blob_count(&cas), 1);
    }

    #[test]
    fn empty_payload_is_storable() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"").unwrap();
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(cas.get(&digest).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = sha256_blob(b"absent");
        assert!(!cas.exists(&digest));
        assert!(matches!(cas.get(&digest), Err(CasError::NotFound { .. })));
        assert!(matches!(cas.get_verified(&digest), Err(CasError::NotFound { .. })));
    }

    #[test]
    fn get_verified_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"hello").unwrap();
        fs::write(cas.blob_path(&digest), b"jello").unwrap();
        // Plain get trusts the path.
        assert_eq!(cas.get(&digest).unwrap(), b"jello");
        match cas.get_verified(&digest) {
            Err(CasError::Integrity { expected, actual, .. }) => {
                assert_eq!(expected, digest);
                assert_eq!(actual, sha256_blob(b"jello"));
            }
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn put_refuses_size_mismatched_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = sha256_blob(b"hello");
        let path = cas.blob_path(&digest);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"something longer").unwrap();
        match cas.put(b"hello") {
            Err(CasError::Collision {
                existing_size,
                payload_size,
                ..
            }) => {
                assert_eq!(existing_size, 16);
                assert_eq!(payload_size, 5);
            }
            other => panic!("expected collision, got {other:?}"),
        }
        // The existing file is left alone.
        assert_eq!(fs::read(&path).unwrap(), b"something longer");
    }

    #[test]
    fn meta_sidecar_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"hello").unwrap();
        let meta = cas.meta(&digest).unwrap().expect("meta should exist");
        assert_eq!(meta.digest, digest);
        assert_eq!(meta.size, 5);
    }

    #[test]
    fn meta_sidecar_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path()).with_blob_meta(false);
        let digest = cas.put(b"hello").unwrap();
        assert!(cas.meta(&digest).unwrap().is_none());
        assert!(!cas.meta_path(&digest).exists());
    }

    #[test]
    fn parse_cas_relative_path_accepts_only_canonical_form() {
        let digest = sha256_blob(b"hello");
        let rel = cas_relative_path(&digest);
        assert_eq!(parse_cas_relative_path(&rel), Some(digest));
        assert_eq!(parse_cas_relative_path(&rel.to_uppercase()), None);
        assert_eq!(
            parse_cas_relative_path(&format!("sha256/00/f2/{HELLO_SHA256}.blob")),
            None
        );
        assert_eq!(parse_cas_relative_path(&format!("../{rel}")), None);
        assert_eq!(parse_cas_relative_path(&format!("{rel}/x")), None);
        assert_eq!(parse_cas_relative_path("sha256/2c/f2/short.blob"), None);
        assert_eq!(parse_cas_relative_path(""), None);
    }

    #[test]
    fn entries_classify_store_contents() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"hello").unwrap();
        let blob_dir = cas.blob_path(&digest).parent().unwrap().to_path_buf();
        fs::write(blob_dir.join("notes.txt"), b"stray").unwrap();
        fs::write(dir.path().join("sha256").join("README"), b"stray").unwrap();
        // Simulate a crash between staging and rename.
        let staged = StagedFile::stage(&blob_dir.join("orphan.blob"), b"partial").unwrap();
        std::mem::forget(staged);

        let mut blobs = 0;
        let mut metas = 0;
        let mut partials = 0;
        let mut unexpected = 0;
        for entry in cas.entries() {
            match entry.unwrap() {
                CasEntry::Blob(loc) => {
                    blobs += 1;
                    assert_eq!(loc.digest, digest);
                    assert!(loc.prefix_ok);
                    assert_eq!(loc.relative, cas_relative_path(&digest));
                }
                CasEntry::Meta(_) => metas += 1,
                CasEntry::Partial(_) => partials += 1,
                CasEntry::Unexpected(_) => unexpected += 1,
            }
        }
        assert_eq!((blobs, metas, partials, unexpected), (1, 1, 1, 2));
    }

    #[test]
    fn misplaced_blob_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let wrong = dir.path().join("sha256").join("00").join("00");
        fs::create_dir_all(&wrong).unwrap();
        fs::write(wrong.join(format!("{HELLO_SHA256}.blob")), b"hello").unwrap();
        let locs: Vec<_> = cas.blobs().collect::<Result<_, _>>().unwrap();
        assert_eq!(locs.len(), 1);
        assert!(!locs[0].prefix_ok);
        assert_eq!(locs[0].relative, format!("sha256/00/00/{HELLO_SHA256}.blob"));
    }

    #[test]
    fn entries_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path().join("nope"));
        assert_eq!(cas.entries().count(), 0);
    }

    #[test]
    fn remove_deletes_blob_meta_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"hello").unwrap();
        assert!(cas.remove(&digest).unwrap());
        assert!(!cas.exists(&digest));
        assert!(!cas.meta_path(&digest).exists());
        assert!(!dir.path().join("sha256").join("2c").exists());
        assert!(!cas.remove(&digest).unwrap());
    }

    /// Leak a staged temp file for `payload`, as a crashed writer would.
    fn orphan(cas: &ContentAddressedStore, payload: &[u8]) -> PathBuf {
        let staged = StagedFile::stage(&cas.blob_path(&sha256_blob(payload)), payload).unwrap();
        let path = staged.temp_path().to_path_buf();
        std::mem::forget(staged);
        path
    }

    fn backdate(path: &Path, by: Duration) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn sweep_partials_removes_orphans_only() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let digest = cas.put(b"hello").unwrap();
        let orphan = orphan(&cas, b"bye");

        let removed = cas.sweep_partials(Duration::ZERO).unwrap();
        assert_eq!(removed, vec![orphan.clone()]);
        assert!(!orphan.exists());
        assert!(cas.exists(&digest));
    }

    #[test]
    fn sweep_partials_spares_recent_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let old = orphan(&cas, b"old");
        backdate(&old, DEFAULT_PARTIAL_MIN_AGE + Duration::from_secs(60));

        let inflight = StagedFile::stage(&cas.blob_path(&sha256_blob(b"new")), b"new").unwrap();
        let removed = cas.sweep_partials(DEFAULT_PARTIAL_MIN_AGE).unwrap();
        assert_eq!(removed, vec![old]);
        assert!(inflight.temp_path().exists());

        inflight.commit().unwrap();
        assert_eq!(cas.get_verified(&sha256_blob(b"new")).unwrap(), b"new");
    }

    #[test]
    fn concurrent_puts_of_same_payload_converge() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentAddressedStore::new(dir.path());
        let payload = b"shared evidence payload".to_vec();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cas = cas.clone();
                let payload = payload.clone();
                std::thread::spawn(move || cas.put(&payload).unwrap())
            })
            .collect();
        let digests: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(digests.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(blob_count(&cas), 1);
        assert_eq!(cas.get_verified(&digests[0]).unwrap(), payload);
        let partials = cas
            .entries()
            .filter(|e| matches!(e, Ok(CasEntry::Partial(_))))
            .count();
        assert_eq!(partials, 0);
    }
}
