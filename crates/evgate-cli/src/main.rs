//! # evgate CLI entry point
//!
//! Parses command-line arguments, resolves configuration, initializes
//! logging, and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evgate_cli::build::{run_build, BuildArgs};
use evgate_cli::cas::{run_get, run_hash, run_put, GetArgs, HashArgs, PutArgs};
use evgate_cli::config::EvgateConfig;
use evgate_cli::prune::{run_prune, PruneArgs};
use evgate_cli::verify::{run_verify, run_verify_cas, VerifyArgs, VerifyCasArgs};
use evgate_cli::EXIT_FAIL;

/// Evidence gate: content-addressed evidence storage, deterministic run
/// manifests, and integrity verification.
#[derive(Parser, Debug)]
#[command(name = "evgate", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to configuration file (default: ./evgate.yaml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of the artifacts tree. Overrides config and EVGATE_ARTIFACTS_ROOT.
    #[arg(long, global = true)]
    artifacts_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a file in the CAS and print its digest.
    Put(PutArgs),

    /// Fetch a blob from the CAS by digest.
    Get(GetArgs),

    /// Print the canonical SHA-256 of a JSON document.
    Hash(HashArgs),

    /// Ingest a run's files and write its run manifest.
    Build(BuildArgs),

    /// Verify run manifests against the CAS.
    Verify(VerifyArgs),

    /// Re-hash every blob in the CAS.
    VerifyCas(VerifyCasArgs),

    /// Remove blobs not referenced by the listed manifests (local only).
    Prune(PruneArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "evgate starting");

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_FAIL)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = EvgateConfig::load(cli.config.as_deref(), &cwd)?
        .with_env(|k| std::env::var(k).ok())
        .with_artifacts_root(cli.artifacts_root);

    tracing::debug!(artifacts_root = %config.artifacts_root.display(), "resolved artifacts root");

    match cli.command {
        Commands::Put(args) => run_put(&args, &config),
        Commands::Get(args) => run_get(&args, &config),
        Commands::Hash(args) => run_hash(&args),
        Commands::Build(args) => run_build(&args, &config),
        Commands::Verify(args) => run_verify(&args, &config),
        Commands::VerifyCas(args) => run_verify_cas(&args, &config),
        Commands::Prune(args) => run_prune(&args, &config),
    }
}

/// Verbosity picks the default filter; `RUST_LOG` wins when set.
fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
