//! # Blob Pruning
//!
//! Deletes CAS blobs that no supplied manifest references. This is the only
//! path in the engine that removes evidence, so it is gated twice:
//!
//! - [`PruneAuthorization`] must be obtained first. It refuses whenever an
//!   automated-execution variable is set, whatever else is set, and
//!   otherwise requires an explicit opt-in.
//! - [`Pruner::prune`] only trusts the manifests it is handed. It never
//!   discovers manifests on its own, and any manifest that fails to load
//!   aborts the prune before anything is deleted.
//!
//! Orphaned temp files are swept only once they are older than the
//! pruner's minimum age, so a `put` running alongside still commits.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use evgate_cas::{ContentAddressedStore, DEFAULT_PARTIAL_MIN_AGE};
use evgate_core::ContentDigest;
use evgate_manifest::RunManifest;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PruneError;

/// Variables whose presence signals CI or other automated execution.
pub const DEFAULT_CI_ENV_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "TF_BUILD",
];

/// Variable that opts a local session into pruning.
pub const DEFAULT_PRUNE_OPT_IN_VAR: &str = "EVGATE_ALLOW_PRUNE";

/// Proof that pruning was authorized for this process.
///
/// Only [`PruneAuthorization::evaluate`] and
/// [`PruneAuthorization::from_env`] construct one.
#[derive(Debug)]
pub struct PruneAuthorization {
    _private: (),
}

impl PruneAuthorization {
    /// Decide whether pruning may run.
    ///
    /// `lookup` reads an environment variable. A CI variable counts as set
    /// when its value is truthy; that refusal wins over `confirmed` and over
    /// the opt-in variable. Otherwise either `confirmed` or a truthy
    /// `opt_in_var` authorizes.
    pub fn evaluate<F, S>(
        lookup: F,
        ci_vars: &[S],
        opt_in_var: &str,
        confirmed: bool,
    ) -> Result<Self, PruneError>
    where
        F: Fn(&str) -> Option<String>,
        S: AsRef<str>,
    {
        for var in ci_vars {
            let var = var.as_ref();
            if lookup(var).is_some_and(|v| is_truthy(&v)) {
                warn!(variable = var, "refusing to prune under CI");
                return Err(PruneError::RefusedInCi {
                    variable: var.to_string(),
                });
            }
        }
        if confirmed || lookup(opt_in_var).is_some_and(|v| is_truthy(&v)) {
            return Ok(Self { _private: () });
        }
        Err(PruneError::NotOptedIn {
            variable: opt_in_var.to_string(),
        })
    }

    /// [`evaluate`](Self::evaluate) against the process environment.
    pub fn from_env<S: AsRef<str>>(
        ci_vars: &[S],
        opt_in_var: &str,
        confirmed: bool,
    ) -> Result<Self, PruneError> {
        Self::evaluate(|k| std::env::var(k).ok(), ci_vars, opt_in_var, confirmed)
    }
}

fn is_truthy(value: &str) -> bool {
    let v = value.trim();
    !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false"))
}

/// What a prune did, or would do in a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub dry_run: bool,
    /// Distinct digests referenced by the supplied manifests.
    pub reachable: usize,
    /// Blobs kept.
    pub retained: usize,
    /// Blobs removed (or that would be removed).
    pub removed: Vec<ContentDigest>,
    pub bytes_freed: u64,
    /// Orphaned temp files swept. Always empty in a dry run.
    pub partials_removed: Vec<PathBuf>,
}

/// Removes unreferenced blobs from one store.
#[derive(Debug, Clone)]
pub struct Pruner {
    store: ContentAddressedStore,
    partial_min_age: Duration,
}

impl Pruner {
    pub fn new(store: ContentAddressedStore) -> Self {
        Self {
            store,
            partial_min_age: DEFAULT_PARTIAL_MIN_AGE,
        }
    }

    /// Minimum age of a temp file before the sweep removes it.
    pub fn with_partial_min_age(mut self, min_age: Duration) -> Self {
        self.partial_min_age = min_age;
        self
    }

    /// Delete every blob not referenced by `manifests`.
    pub fn prune(
        &self,
        _auth: &PruneAuthorization,
        manifests: &[PathBuf],
        dry_run: bool,
    ) -> Result<PruneReport, PruneError> {
        if manifests.is_empty() {
            return Err(PruneError::NoManifests);
        }

        let mut reachable = BTreeSet::new();
        for path in manifests {
            let manifest = RunManifest::load(path)?;
            reachable.extend(manifest.referenced_digests());
        }

        let blobs = self.store.blobs().collect::<Result<Vec<_>, _>>()?;
        let mut report = PruneReport {
            dry_run,
            reachable: reachable.len(),
            retained: 0,
            removed: Vec::new(),
            bytes_freed: 0,
            partials_removed: Vec::new(),
        };

        for loc in blobs {
            if reachable.contains(&loc.digest) {
                report.retained += 1;
                continue;
            }
            let size = fs::metadata(&loc.path).map(|m| m.len()).unwrap_or(0);
            if dry_run {
                debug!(digest = %loc.digest, size, "would remove blob");
            } else if loc.prefix_ok {
                self.store.remove(&loc.digest)?;
            } else {
                match fs::remove_file(&loc.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(PruneError::Io {
                            path: loc.path,
                            source,
                        })
                    }
                }
            }
            report.bytes_freed += size;
            report.removed.push(loc.digest);
        }

        if !dry_run {
            report.partials_removed = self.store.sweep_partials(self.partial_min_age)?;
        }

        info!(
            dry_run,
            reachable = report.reachable,
            retained = report.retained,
            removed = report.removed.len(),
            bytes_freed = report.bytes_freed,
            "pruned CAS"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn authorize(
        pairs: &[(&str, &str)],
        confirmed: bool,
    ) -> Result<PruneAuthorization, PruneError> {
        PruneAuthorization::evaluate(
            env(pairs),
            DEFAULT_CI_ENV_VARS,
            DEFAULT_PRUNE_OPT_IN_VAR,
            confirmed,
        )
    }

    #[test]
    fn ci_refusal_beats_every_opt_in() {
        let err = authorize(&[("CI", "true"), ("EVGATE_ALLOW_PRUNE", "1")], true).unwrap_err();
        assert!(matches!(err, PruneError::RefusedInCi { ref variable } if variable == "CI"));

        let err = authorize(&[("GITHUB_ACTIONS", "true")], true).unwrap_err();
        assert!(matches!(err, PruneError::RefusedInCi { .. }));
    }

    #[test]
    fn falsy_ci_values_do_not_refuse() {
        for v in ["", "0", "false", "FALSE", " "] {
            assert!(authorize(&[("CI", v)], true).is_ok(), "CI={v:?}");
        }
    }

    #[test]
    fn opt_in_required() {
        let err = authorize(&[], false).unwrap_err();
        assert!(matches!(
            err,
            PruneError::NotOptedIn { ref variable } if variable == "EVGATE_ALLOW_PRUNE"
        ));
        assert!(authorize(&[("EVGATE_ALLOW_PRUNE", "0")], false).is_err());
        assert!(authorize(&[("EVGATE_ALLOW_PRUNE", "yes")], false).is_ok());
        assert!(authorize(&[], true).is_ok());
    }

    #[test]
    fn custom_ci_var_list() {
        let err = PruneAuthorization::evaluate(
            env(&[("DRONE", "true")]),
            &["DRONE"],
            DEFAULT_PRUNE_OPT_IN_VAR,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, PruneError::RefusedInCi { .. }));
    }

    #[test]
    fn no_manifests_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentAddressedStore::new(dir.path());
        let digest = store.put(b"keep me").unwrap();
        let auth = authorize(&[], true).unwrap();
        let err = Pruner::new(store.clone()).prune(&auth, &[], false).unwrap_err();
        assert!(matches!(err, PruneError::NoManifests));
        assert!(store.exists(&digest));
    }

    #[test]
    fn truthiness() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("anything"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("False"));
        assert!(!is_truthy(""));
    }
}
