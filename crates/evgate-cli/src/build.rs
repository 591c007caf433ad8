//! # `build`
//!
//! Ingest a run's files into the CAS and write its manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use evgate_core::{LogicalPath, RunCategory, RunSha};
use evgate_manifest::RunManifestBuilder;

use crate::config::EvgateConfig;
use crate::{parse_key_value, EXIT_OK};

/// Arguments for `evgate build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Run category, e.g. `evidence`, `ga-verify`, `governance/sbom`.
    #[arg(long)]
    pub category: String,

    /// Commit identifier of the run.
    #[arg(long)]
    pub sha: String,

    /// A file to ingest, as LOGICAL=LOCAL. Repeatable.
    #[arg(long = "file", value_name = "LOGICAL=LOCAL", value_parser = parse_key_value)]
    pub files: Vec<(String, String)>,

    /// Ingest every file under this directory, named by its relative path.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// A tool version to record, as NAME=VERSION. Repeatable.
    #[arg(long = "tool", value_name = "NAME=VERSION", value_parser = parse_key_value)]
    pub tools: Vec<(String, String)>,

    /// A policy hash to record, as NAME=DIGEST. Repeatable.
    #[arg(long = "policy", value_name = "NAME=DIGEST", value_parser = parse_key_value)]
    pub policies: Vec<(String, String)>,
}

/// Build the manifest and print where it was written.
pub fn run_build(args: &BuildArgs, config: &EvgateConfig) -> Result<u8> {
    let category = RunCategory::new(&args.category)?;
    let sha = RunSha::new(&args.sha)?;
    let layout = config.layout();
    let mut builder = RunManifestBuilder::new(layout, config.store(), category, sha);

    for (logical, local) in &args.files {
        builder = builder.file(LogicalPath::new(logical)?, PathBuf::from(local));
    }
    if let Some(dir) = &args.dir {
        builder = builder
            .dir(dir)
            .with_context(|| format!("failed to read input directory {}", dir.display()))?;
    }
    let tools = config
        .tool_versions
        .iter()
        .chain(args.tools.iter().map(|(k, v)| (k, v)));
    for (tool, version) in tools {
        builder = builder.tool_version(tool, version);
    }
    for (name, digest) in &args.policies {
        builder = builder.policy_hash(name, digest);
    }

    let path = builder.manifest_path();
    let manifest = builder.build().context("manifest build failed")?;
    eprintln!(
        "OK: {} files, category={} sha={}",
        manifest.files.len(),
        manifest.category,
        manifest.sha
    );
    println!("{}", path.display());
    Ok(EXIT_OK)
}
