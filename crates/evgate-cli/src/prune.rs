//! # `prune`
//!
//! Local-only cleanup of blobs no listed manifest references. Refused under
//! CI and without an explicit opt-in; refusals exit with code 2.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use evgate_verify::{PruneAuthorization, PruneReport, Pruner};

use crate::config::EvgateConfig;
use crate::{EXIT_OK, EXIT_REFUSED};

/// Arguments for `evgate prune`.
#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Manifests whose blobs are kept. Repeatable; every manifest that
    /// should survive must be listed.
    #[arg(long = "manifest", value_name = "MANIFEST", required = true)]
    pub manifests: Vec<PathBuf>,

    /// Report what would be removed without removing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Opt in to pruning for this invocation.
    #[arg(long)]
    pub confirm: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run_prune(args: &PruneArgs, config: &EvgateConfig) -> Result<u8> {
    run_prune_with_env(args, config, |k| std::env::var(k).ok())
}

/// [`run_prune`] with an injected environment lookup.
pub fn run_prune_with_env(
    args: &PruneArgs,
    config: &EvgateConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<u8> {
    let auth = match PruneAuthorization::evaluate(
        lookup,
        config.ci_env_vars.as_slice(),
        &config.prune_opt_in_var,
        args.confirm,
    ) {
        Ok(auth) => auth,
        Err(e) if e.is_refusal() => {
            eprintln!("REFUSED: {e}");
            return Ok(EXIT_REFUSED);
        }
        Err(e) => return Err(e.into()),
    };

    let pruner = Pruner::new(config.store())
        .with_partial_min_age(Duration::from_secs(config.partial_min_age_secs));
    let report = match pruner.prune(&auth, &args.manifests, args.dry_run) {
        Ok(report) => report,
        Err(e) if e.is_refusal() => {
            eprintln!("REFUSED: {e}");
            return Ok(EXIT_REFUSED);
        }
        Err(e) => return Err(e).context("prune failed"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(EXIT_OK)
}

fn print_report(report: &PruneReport) {
    let verb = if report.dry_run { "would remove" } else { "removed" };
    for digest in &report.removed {
        println!("{verb} {digest}");
    }
    println!(
        "OK: {verb} {} blobs ({} bytes), retained {}, swept {} temp files",
        report.removed.len(),
        report.bytes_freed,
        report.retained,
        report.partials_removed.len()
    );
}
