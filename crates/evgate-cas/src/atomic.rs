//! # Atomic Writes
//!
//! The write-temp-fsync-rename protocol behind every durable write in the
//! engine (CAS blobs, blob metadata, run manifests).
//!
//! A canonical path either does not exist or holds fully-written content.
//! Partial data only ever lives in a temporary file next to the destination,
//! named `.<file>.tmp-<uuid>`, which [`is_temp_file_name()`] recognizes so
//! sweeps can skip or remove it.
//!
//! [`AtomicWriter`] is the seam: the store and the manifest builder take an
//! `Arc<dyn AtomicWriter>` so the primitive can be swapped per platform or
//! per test without touching their logic.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Marker embedded in temporary file names.
const TEMP_MARKER: &str = ".tmp-";

/// Durable, all-or-nothing file replacement.
pub trait AtomicWriter: std::fmt::Debug + Send + Sync {
    /// Make `bytes` visible at `dest` in one step, creating parent
    /// directories as needed. On error `dest` is untouched.
    fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Default writer: co-located temp file, `fsync`, `rename`, then a
/// best-effort `fsync` of the parent directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsyncRenameWriter;

impl AtomicWriter for FsyncRenameWriter {
    fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> io::Result<()> {
        StagedFile::stage(dest, bytes)?.commit()
    }
}

/// A fully written and flushed temp file waiting to be renamed into place.
///
/// Dropping a `StagedFile` without committing removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Write `bytes` to a fresh temp file beside `dest` and flush it.
    pub fn stage(dest: &Path, bytes: &[u8]) -> io::Result<Self> {
        let parent = parent_dir(dest)?;
        fs::create_dir_all(parent)?;
        let temp = temp_path_for(dest)?;

        let staged = Self {
            temp,
            dest: dest.to_path_buf(),
            committed: false,
        };
        // `create_new` so two writers never share a temp file.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged.temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(staged)
    }

    /// Path of the temp file holding the staged content.
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Final destination of the staged content.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Atomically rename the temp file onto its destination.
    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.temp, &self.dest)?;
        self.committed = true;
        if let Ok(parent) = parent_dir(&self.dest) {
            if let Err(e) = fsync_dir(parent) {
                debug!(dir = %parent.display(), error = %e, "directory fsync skipped");
            }
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Returns true for names produced by [`temp_path_for()`].
pub fn is_temp_file_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TEMP_MARKER)
}

/// Build a unique temp path in the same directory as `dest`.
pub fn temp_path_for(dest: &Path) -> io::Result<PathBuf> {
    let parent = parent_dir(dest)?;
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("destination has no file name: {}", dest.display()),
            )
        })?;
    Ok(parent.join(format!(".{name}{TEMP_MARKER}{}", uuid::Uuid::new_v4().simple())))
}

fn parent_dir(path: &Path) -> io::Result<&Path> {
    path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination has no parent directory: {}", path.display()),
        )
    })
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
