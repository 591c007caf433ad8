//! # `put`, `get`, `hash`
//!
//! Direct access to the CAS and to the canonical structured-data hash.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use evgate_cas::CasError;
use evgate_core::{sha256_digest, CanonicalBytes, ContentDigest};

use crate::config::EvgateConfig;
use crate::{EXIT_FAIL, EXIT_OK};

/// Arguments for `evgate put`.
#[derive(Args, Debug)]
pub struct PutArgs {
    /// File whose bytes are stored.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Arguments for `evgate get`.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// SHA-256 hex digest of the blob.
    #[arg(value_name = "DIGEST")]
    pub digest: String,

    /// Re-hash the blob and fail if it does not match the digest.
    #[arg(long)]
    pub verify: bool,

    /// Write the blob here instead of stdout.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

/// Arguments for `evgate hash`.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// JSON file to canonicalize and hash.
    #[arg(value_name = "JSON_FILE")]
    pub file: PathBuf,

    /// Also print the canonical form.
    #[arg(long)]
    pub print_canonical: bool,
}

/// Store a file's bytes and print the digest.
pub fn run_put(args: &PutArgs, config: &EvgateConfig) -> Result<u8> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read file: {}", args.file.display()))?;
    let stored = config
        .store()
        .store(&bytes)
        .context("CAS put failed")?;
    tracing::info!(
        file = %args.file.display(),
        digest = %stored.digest,
        new = stored.written,
        "put"
    );
    println!("{}", stored.digest);
    Ok(EXIT_OK)
}

/// Fetch a blob by digest.
pub fn run_get(args: &GetArgs, config: &EvgateConfig) -> Result<u8> {
    let digest = ContentDigest::from_hex(&args.digest)
        .with_context(|| format!("invalid digest: {}", args.digest))?;
    let store = config.store();
    let fetched = if args.verify {
        store.get_verified(&digest)
    } else {
        store.get(&digest)
    };
    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(CasError::NotFound { .. }) => {
            eprintln!("NOT FOUND: digest={digest}");
            return Ok(EXIT_FAIL);
        }
        Err(e @ CasError::Integrity { .. }) => {
            eprintln!("FAIL: {e}");
            return Ok(EXIT_FAIL);
        }
        Err(e) => return Err(e).context("CAS get failed"),
    };

    match &args.out {
        Some(out) => std::fs::write(out, &bytes)
            .with_context(|| format!("failed to write {}", out.display()))?,
        None => std::io::stdout()
            .lock()
            .write_all(&bytes)
            .context("failed to write to stdout")?,
    }
    Ok(EXIT_OK)
}

/// Canonicalize a JSON file and print its SHA-256.
pub fn run_hash(args: &HashArgs) -> Result<u8> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read file: {}", args.file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse JSON: {}", args.file.display()))?;
    let canonical = CanonicalBytes::from_value(value)
        .with_context(|| format!("failed to canonicalize: {}", args.file.display()))?;
    if args.print_canonical {
        println!("{}", canonical.as_str());
    }
    println!("{}", sha256_digest(&canonical));
    Ok(EXIT_OK)
}
