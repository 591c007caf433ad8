//! # `verify`, `verify-cas`
//!
//! Prints the full failure list verbatim. Exit code 1 on any failure.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use evgate_verify::{
    FailureKind, PolicyExpectations, VerificationFailure, VerificationResult, Verifier,
    VerifyError,
};

use crate::config::EvgateConfig;
use crate::{parse_key_value, EXIT_FAIL, EXIT_OK};

/// Arguments for `evgate verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Manifest files to verify.
    #[arg(value_name = "MANIFEST", required_unless_present = "all", conflicts_with = "all")]
    pub manifests: Vec<PathBuf>,

    /// Verify every run-manifest.json under the artifacts root.
    #[arg(long)]
    pub all: bool,

    /// Require a policy hash, as NAME=DIGEST. Repeatable.
    #[arg(long = "policy", value_name = "NAME=DIGEST", value_parser = parse_key_value)]
    pub policies: Vec<(String, String)>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `evgate verify-cas`.
#[derive(Args, Debug)]
pub struct VerifyCasArgs {
    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run_verify(args: &VerifyArgs, config: &EvgateConfig) -> Result<u8> {
    let verifier = Verifier::with_store(config.layout(), config.store());
    let expected: PolicyExpectations = args.policies.iter().cloned().collect();

    let result = if args.all {
        verifier.verify_all_with_policies(&expected)
    } else {
        let mut total = VerificationResult::pass();
        for path in &args.manifests {
            match verifier.verify_manifest_with_policies(path, &expected) {
                Ok(result) => total.merge(result),
                Err(VerifyError::Manifest(e)) => {
                    let mut malformed = VerificationResult::from_failures(vec![
                        VerificationFailure::new(FailureKind::MalformedManifest)
                            .manifest(path)
                            .actual(e.to_string()),
                    ]);
                    malformed.manifests_checked = 1;
                    total.merge(malformed);
                }
            }
        }
        total
    };

    emit(&result, args.json)?;
    Ok(exit_code(&result))
}

pub fn run_verify_cas(args: &VerifyCasArgs, config: &EvgateConfig) -> Result<u8> {
    let verifier = Verifier::with_store(config.layout(), config.store());
    let result = verifier.verify_cas_integrity();
    emit(&result, args.json)?;
    Ok(exit_code(&result))
}

fn emit(result: &VerificationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{result}");
    }
    Ok(())
}

fn exit_code(result: &VerificationResult) -> u8 {
    if result.is_pass() {
        EXIT_OK
    } else {
        EXIT_FAIL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgate_core::{LogicalPath, RunCategory, RunSha};
    use evgate_manifest::RunManifestBuilder;

    fn built(root: &std::path::Path) -> (EvgateConfig, PathBuf) {
        let cfg = EvgateConfig::default().with_artifacts_root(Some(root.to_path_buf()));
        let m = RunManifestBuilder::new(
            cfg.layout(),
            cfg.store(),
            RunCategory::new("evidence").unwrap(),
            RunSha::new("abc").unwrap(),
        )
        .bytes(LogicalPath::new("a.txt").unwrap(), b"a".to_vec())
        .build()
        .unwrap();
        let path = cfg.layout().manifest_path(&m.category, &m.sha);
        (cfg, path)
    }

    fn args(manifests: Vec<PathBuf>, all: bool) -> VerifyArgs {
        VerifyArgs {
            manifests,
            all,
            policies: Vec::new(),
            json: false,
        }
    }

    #[test]
    fn passing_manifest_exits_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, path) = built(dir.path());
        assert_eq!(run_verify(&args(vec![path], false), &cfg).unwrap(), EXIT_OK);
        assert_eq!(run_verify(&args(Vec::new(), true), &cfg).unwrap(), EXIT_OK);
        assert_eq!(
            run_verify_cas(&VerifyCasArgs { json: true }, &cfg).unwrap(),
            EXIT_OK
        );
    }

    #[test]
    fn malformed_manifest_exits_fail_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, good) = built(dir.path());
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"[]").unwrap();
        assert_eq!(
            run_verify(&args(vec![good, bad], false), &cfg).unwrap(),
            EXIT_FAIL
        );
    }

    #[test]
    fn policy_mismatch_exits_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, path) = built(dir.path());
        let mut a = args(vec![path], false);
        a.policies.push(("release".into(), "ab".repeat(32)));
        assert_eq!(run_verify(&a, &cfg).unwrap(), EXIT_FAIL);
    }
}
