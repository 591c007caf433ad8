//! # CLI Configuration
//!
//! Resolution order, later wins:
//!
//! 1. Built-in defaults.
//! 2. YAML file: `--config <path>`, or `evgate.yaml` in the working
//!    directory when present.
//! 3. `EVGATE_ARTIFACTS_ROOT`.
//! 4. `--artifacts-root`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use evgate_cas::{ContentAddressedStore, DEFAULT_PARTIAL_MIN_AGE};
use evgate_manifest::ArtifactLayout;
use evgate_verify::{DEFAULT_CI_ENV_VARS, DEFAULT_PRUNE_OPT_IN_VAR};

/// Config file picked up from the working directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "evgate.yaml";

/// Environment override for the artifacts root.
pub const ARTIFACTS_ROOT_ENV: &str = "EVGATE_ARTIFACTS_ROOT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvgateConfig {
    /// Root of the artifacts tree; the CAS lives in `<root>/cas`.
    pub artifacts_root: PathBuf,
    /// Variables whose truthy presence marks automated execution.
    pub ci_env_vars: Vec<String>,
    /// Variable that opts a local session into pruning.
    pub prune_opt_in_var: String,
    /// Write `.meta.json` sidecars for new blobs.
    pub write_blob_meta: bool,
    /// Temp files younger than this many seconds are left alone by `prune`.
    pub partial_min_age_secs: u64,
    /// Tool versions recorded in every manifest unless overridden by `--tool`.
    pub tool_versions: BTreeMap<String, String>,
}

impl Default for EvgateConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from("artifacts"),
            ci_env_vars: DEFAULT_CI_ENV_VARS.iter().map(|s| s.to_string()).collect(),
            prune_opt_in_var: DEFAULT_PRUNE_OPT_IN_VAR.to_string(),
            write_blob_meta: true,
            partial_min_age_secs: DEFAULT_PARTIAL_MIN_AGE.as_secs(),
            tool_versions: BTreeMap::new(),
        }
    }
}

impl EvgateConfig {
    /// Load from `explicit`, else from `evgate.yaml` in `cwd` if it exists,
    /// else defaults. An explicit path that cannot be read is an error.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let implicit = cwd.join(CONFIG_FILE_NAME);
                if !implicit.is_file() {
                    return Ok(Self::default());
                }
                implicit
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup(ARTIFACTS_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.artifacts_root = PathBuf::from(root);
        }
        self
    }

    /// Apply the `--artifacts-root` flag.
    pub fn with_artifacts_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.artifacts_root = root;
        }
        self
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.artifacts_root)
    }

    pub fn store(&self) -> ContentAddressedStore {
        ContentAddressedStore::new(self.layout().cas_root()).with_blob_meta(self.write_blob_meta)
    }
}
