//! # CAS Error Types
//!
//! Structured errors for content-addressed store operations.

use std::path::PathBuf;

use evgate_core::ContentDigest;
use thiserror::Error;

/// Errors from the content-addressed store.
#[derive(Error, Debug)]
pub enum CasError {
    /// No blob exists at the path derived from the digest.
    #[error("blob not found: {digest}")]
    NotFound {
        /// The requested digest.
        digest: ContentDigest,
    },

    /// Stored bytes hash to a different digest than their path claims.
    #[error("integrity violation: blob at {} has digest {actual} but was requested as {expected}", path.display())]
    Integrity {
        /// The requested digest.
        expected: ContentDigest,
        /// The digest recomputed from the stored bytes.
        actual: ContentDigest,
        /// The blob path that was read.
        path: PathBuf,
    },

    /// A blob already exists at the digest path with a different size than
    /// the payload being written.
    #[error("digest collision at {digest}: existing blob is {existing_size} bytes, payload is {payload_size} bytes")]
    Collision {
        /// The digest both payloads claim.
        digest: ContentDigest,
        /// Size of the blob already on disk.
        existing_size: u64,
        /// Size of the payload that was rejected.
        payload_size: u64,
    },

    /// Blob metadata could not be serialized.
    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Walking the store directory failed.
    #[error("store walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// I/O error (disk full, permission denied, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
