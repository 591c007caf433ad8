//! # Manifest Error Types

use std::path::PathBuf;

use evgate_cas::CasError;
use evgate_core::{CanonicalizationError, EvgateError, LogicalPath};
use thiserror::Error;

/// Errors from building, loading, or writing run manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Two inputs of one run share a logical path.
    #[error("duplicate logical path in run: {path}")]
    DuplicatePath {
        /// The repeated logical path.
        path: LogicalPath,
    },

    /// A manifest file is not valid JSON or lacks required fields.
    #[error("malformed manifest {}: {reason}", path.display())]
    Malformed {
        /// The manifest file that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A category, sha, or logical path failed validation.
    #[error(transparent)]
    Identifier(#[from] EvgateError),

    /// Hashing the manifest content failed.
    #[error("manifest canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Ingesting a file into the CAS failed.
    #[error("CAS error: {0}")]
    Cas(#[from] CasError),

    /// Manifest serialization failed.
    #[error("manifest serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Walking an input directory failed.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Reading an input file or writing the manifest failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
