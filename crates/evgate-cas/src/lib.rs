//! # evgate-cas — Content-Addressed Blob Store
//!
//! Immutable, SHA-256 addressed storage for evidence files, plus the atomic
//! write primitive every durable write in the engine goes through.
//!
//! - [`atomic`]: the [`AtomicWriter`] seam and its default
//!   write-temp-fsync-rename implementation.
//! - [`cas`]: the [`ContentAddressedStore`] and its on-disk layout helpers.
//! - [`error`]: [`CasError`].

pub mod atomic;
pub mod cas;
pub mod error;

pub use atomic::{is_temp_file_name, AtomicWriter, FsyncRenameWriter, StagedFile};
pub use cas::{
    cas_relative_path, parse_cas_relative_path, BlobLocation, BlobMeta, CasEntry,
    ContentAddressedStore, StoredBlob, DEFAULT_PARTIAL_MIN_AGE,
};
pub use error::CasError;
