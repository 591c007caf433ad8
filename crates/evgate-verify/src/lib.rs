//! # evgate-verify — Evidence Verification
//!
//! Confirms that run manifests and the CAS underneath them still say what
//! they said when they were written:
//!
//! - [`Verifier::verify_manifest`] re-derives every digest in one manifest.
//! - [`Verifier::verify_all`] does the same for every manifest under the
//!   artifacts root.
//! - [`Verifier::verify_cas_integrity`] re-hashes every blob in the store.
//!
//! Results are [`VerificationResult`]s listing every problem found. The
//! verifier is read-only; the separate [`Pruner`] is the one component that
//! deletes blobs, and only with a [`PruneAuthorization`].

pub mod error;
pub mod prune;
pub mod report;
pub mod verifier;

pub use error::{PruneError, VerifyError};
pub use prune::{
    PruneAuthorization, PruneReport, Pruner, DEFAULT_CI_ENV_VARS, DEFAULT_PRUNE_OPT_IN_VAR,
};
pub use report::{FailureKind, OverallStatus, VerificationFailure, VerificationResult};
pub use verifier::{PolicyExpectations, Verifier};
