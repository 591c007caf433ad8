//! # evgate-core — Foundational Types for the Evidence Gate Engine
//!
//! The leaf of the workspace DAG. Every other `evgate-*` crate depends on
//! this one; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **One canonicalizer.** All structured-data hashing flows through
//!    `CanonicalBytes::new()`. The builder and the verifier share it, so the
//!    two can never disagree on a digest.
//!
//! 2. **Digests are typed.** `ContentDigest` is always 32 bytes of SHA-256 and
//!    always renders as 64 lowercase hex characters.
//!
//! 3. **Validated identifiers.** `RunCategory`, `RunSha` and `LogicalPath`
//!    reject anything that could escape its directory on disk.
//!
//! 4. **UTC-only timestamps.** `Timestamp` is informational and never hashed
//!    as part of an integrity check.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `evgate-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::{canonicalize, CanonicalBytes, MAX_DEPTH};
pub use digest::{canonical_hash, sha256_blob, sha256_digest, ContentDigest, DIGEST_HEX_LEN};
pub use error::{CanonicalizationError, EvgateError};
pub use identity::{LogicalPath, RunCategory, RunSha};
pub use temporal::Timestamp;
