//! # Error Types
//!
//! Errors shared by every crate in the evidence gate workspace. All errors
//! use `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Canonicalization failures name the offending JSON location so the
//!   producer can fix its input.
//! - Identifier validation errors carry the rejected value verbatim.
//! - Nothing here is retried automatically: a bad input stays bad.

use thiserror::Error;

/// Top-level error type for foundational operations.
#[derive(Error, Debug)]
pub enum EvgateError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A digest string was not 64 hex characters.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// An identifier (category, sha, logical path) failed validation.
    #[error("invalid {kind}: {reason}")]
    InvalidIdentifier {
        /// Which identifier was rejected (e.g. "category").
        kind: &'static str,
        /// Why it was rejected, including the offending value.
        reason: String,
    },

    /// Timestamp parsing failed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error during canonical serialization.
///
/// Every variant is an explicit rejection. Values that cannot be represented
/// canonically are never coerced into something that can.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// NaN and infinities have no JSON representation.
    #[error("non-finite number at {location}: {value}")]
    NonFiniteNumber {
        /// JSON-pointer-like location of the value.
        location: String,
        /// The rejected number, rendered by Rust's float formatter.
        value: String,
    },

    /// Two object keys collapsed to the same string after NFC normalization.
    #[error("duplicate key {key:?} at {location} after NFC normalization")]
    DuplicateKey {
        /// JSON-pointer-like location of the object.
        location: String,
        /// The normalized key that appeared twice.
        key: String,
    },

    /// Nesting exceeded [`MAX_DEPTH`](crate::canonical::MAX_DEPTH).
    #[error("nesting depth exceeds {max} at {location}")]
    DepthExceeded {
        /// JSON-pointer-like location where the limit was hit.
        location: String,
        /// The configured maximum depth.
        max: usize,
    },

    /// A map key was not representable as a JSON string.
    #[error("unsupported map key at {location}: {reason}")]
    UnsupportedKey {
        /// JSON-pointer-like location of the map.
        location: String,
        /// Serializer message.
        reason: String,
    },

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
