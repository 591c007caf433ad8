//! # Verifier and Pruner Errors
//!
//! Only conditions that stop a pass from running at all are errors.
//! Everything a pass detects is a [`VerificationFailure`](crate::VerificationFailure).

use std::path::PathBuf;

use evgate_cas::CasError;
use evgate_manifest::ManifestError;
use thiserror::Error;

/// Errors that prevent verification from producing a result.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The manifest to verify could not be read or parsed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Errors from the pruner, including its refusals.
#[derive(Error, Debug)]
pub enum PruneError {
    /// An automated-execution signal is present.
    #[error("pruning refused: {variable} is set, which indicates CI")]
    RefusedInCi {
        /// The environment variable that triggered the refusal.
        variable: String,
    },

    /// Neither the confirmation flag nor the opt-in variable is set.
    #[error("pruning requires explicit opt-in: pass confirmation or set {variable}")]
    NotOptedIn {
        /// The opt-in environment variable.
        variable: String,
    },

    /// No manifests were supplied, so nothing would be retained.
    #[error("pruning requires at least one manifest")]
    NoManifests,

    /// A supplied manifest could not be read or parsed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Walking or modifying the CAS failed.
    #[error("CAS error: {0}")]
    Cas(#[from] CasError),

    /// Deleting a misplaced blob failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PruneError {
    /// Whether this is a policy refusal rather than a failure.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            PruneError::RefusedInCi { .. }
                | PruneError::NotOptedIn { .. }
                | PruneError::NoManifests
        )
    }
}
