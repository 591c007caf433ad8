//! # evgate-cli — Evidence Gate Command Line
//!
//! Provides the `evgate` binary that CI scripts call to record and check
//! evidence.
//!
//! ## Subcommands
//!
//! - `evgate put` / `evgate get`: raw CAS access.
//! - `evgate hash`: canonical SHA-256 of a JSON document.
//! - `evgate build`: ingest a run and write its manifest.
//! - `evgate verify` / `evgate verify-cas`: integrity checks.
//! - `evgate prune`: local-only removal of unreferenced blobs.
//!
//! ## Exit codes
//!
//! `0` success or PASS, `1` FAIL or error, `2` refused operation.
//!
//! Command results go to stdout. Logs go to stderr.

pub mod build;
pub mod cas;
pub mod config;
pub mod prune;
pub mod verify;

/// Success or PASS.
pub const EXIT_OK: u8 = 0;

/// Verification FAIL, missing blob, or any error.
pub const EXIT_FAIL: u8 = 1;

/// The operation was refused by policy (CI, missing opt-in).
pub const EXIT_REFUSED: u8 = 2;

/// Parse a `KEY=VALUE` argument. The key must be non-empty; the value may
/// contain further `=` characters.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}
