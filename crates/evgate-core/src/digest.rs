//! # Content Digest — Content-Addressed Identifiers
//!
//! Defines `ContentDigest`, the SHA-256 identity used for CAS blobs, manifest
//! file entries, and policy anchors.
//!
//! ## Two Hashing Paths
//!
//! - [`sha256_digest()`] hashes `CanonicalBytes`, the only path for
//!   structured data, so `hash(value) = SHA256(canonicalize(value))`.
//! - [`sha256_blob()`] hashes raw evidence bytes exactly as they sit on disk.
//!   Blobs are opaque; re-canonicalizing them would change their identity.
//!
//! Both render as 64 lowercase hex characters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::{CanonicalizationError, EvgateError};

/// Length of a hex-rendered SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// A SHA-256 content digest.
///
/// Serializes as a 64-char lowercase hex string, which is the form used in
/// manifests and on the CAS path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Wrap a raw 32-byte digest.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-char hex digest. Uppercase input is accepted and
    /// normalized; surrounding whitespace is not.
    pub fn from_hex(hex: &str) -> Result<Self, EvgateError> {
        if hex.len() != DIGEST_HEX_LEN {
            return Err(EvgateError::InvalidDigest(format!(
                "expected {DIGEST_HEX_LEN} hex chars, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 32];
        let raw = hex.as_bytes();
        for (i, out) in bytes.iter_mut().enumerate() {
            let hi = hex_nibble(raw[2 * i]);
            let lo = hex_nibble(raw[2 * i + 1]);
            match (hi, lo) {
                (Some(h), Some(l)) => *out = (h << 4) | l,
                _ => {
                    return Err(EvgateError::InvalidDigest(format!(
                        "non-hex character in {hex:?}"
                    )))
                }
            }
        }
        Ok(Self(bytes))
    }

    /// Returns true if `s` is already a canonical digest string:
    /// exactly 64 lowercase hex characters.
    pub fn is_canonical_hex(s: &str) -> bool {
        s.len() == DIGEST_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Access the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for ContentDigest {
    type Err = EvgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compute the SHA-256 digest of canonical bytes.
///
/// The signature accepts only `CanonicalBytes`, so structured data cannot be
/// hashed through a non-canonical serialization.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    sha256_raw(data.as_bytes())
}

/// Compute the SHA-256 digest of an opaque evidence blob.
pub fn sha256_blob(bytes: &[u8]) -> ContentDigest {
    sha256_raw(bytes)
}

/// Canonicalize a value and hash it: `SHA256(canonicalize(value))`.
pub fn canonical_hash(
    value: &impl Serialize,
) -> Result<ContentDigest, CanonicalizationError> {
    let cb = CanonicalBytes::new(value)?;
    Ok(sha256_digest(&cb))
}

fn sha256_raw(bytes: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    ContentDigest(out)
}
