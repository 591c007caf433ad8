//! # Pruning Safety
//!
//! Only blobs unreachable from the supplied manifests are removed, CI always
//! refuses, and a bad manifest aborts before any deletion.

use std::fs;
use std::time::Duration;

use evgate_cas::ContentAddressedStore;
use evgate_core::{LogicalPath, RunCategory, RunSha};
use evgate_manifest::{ArtifactLayout, RunManifestBuilder};
use evgate_verify::{
    PruneAuthorization, PruneError, Pruner, Verifier, DEFAULT_CI_ENV_VARS,
    DEFAULT_PRUNE_OPT_IN_VAR,
};

fn local_auth() -> PruneAuthorization {
    PruneAuthorization::evaluate(|_| None, DEFAULT_CI_ENV_VARS, DEFAULT_PRUNE_OPT_IN_VAR, true)
        .unwrap()
}

/// A store holding X (referenced by the returned manifest) and Y (not).
fn x_and_y() -> (
    tempfile::TempDir,
    ArtifactLayout,
    ContentAddressedStore,
    std::path::PathBuf,
) {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let store = layout.store();
    let m = RunManifestBuilder::new(
        layout.clone(),
        store.clone(),
        RunCategory::new("evidence").unwrap(),
        RunSha::new("abc").unwrap(),
    )
    .bytes(LogicalPath::new("x.txt").unwrap(), b"X".to_vec())
    .build()
    .unwrap();
    store.put(b"Y").unwrap();
    let path = layout.manifest_path(&m.category, &m.sha);
    (dir, layout, store, path)
}

#[test]
fn unreferenced_blob_removed_referenced_retained() {
    let (_dir, layout, store, manifest) = x_and_y();
    let x = evgate_core::sha256_blob(b"X");
    let y = evgate_core::sha256_blob(b"Y");

    let report = Pruner::new(store.clone())
        .prune(&local_auth(), &[manifest.clone()], false)
        .unwrap();

    assert_eq!(report.removed, vec![y]);
    assert_eq!(report.retained, 1);
    assert_eq!(report.bytes_freed, 1);
    assert!(store.exists(&x));
    assert!(!store.exists(&y));
    assert!(!store.meta_path(&y).exists());
    assert!(Verifier::new(layout)
        .verify_manifest(&manifest)
        .unwrap()
        .is_pass());
}

#[test]
fn dry_run_deletes_nothing() {
    let (_dir, _layout, store, manifest) = x_and_y();
    let y = evgate_core::sha256_blob(b"Y");

    let report = Pruner::new(store.clone())
        .prune(&local_auth(), &[manifest], true)
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.removed, vec![y]);
    assert!(store.exists(&y));
}

#[test]
fn refused_under_ci_regardless_of_flags() {
    let (_dir, _layout, store, _manifest) = x_and_y();
    let lookup = |k: &str| match k {
        "CI" => Some("true".to_string()),
        "EVGATE_ALLOW_PRUNE" => Some("1".to_string()),
        _ => None,
    };
    let err =
        PruneAuthorization::evaluate(lookup, DEFAULT_CI_ENV_VARS, DEFAULT_PRUNE_OPT_IN_VAR, true)
            .unwrap_err();
    assert!(matches!(err, PruneError::RefusedInCi { .. }));
    assert!(err.is_refusal());
    assert_eq!(store.blobs().count(), 2);
}

#[test]
fn malformed_manifest_aborts_before_deleting() {
    let (dir, _layout, store, good) = x_and_y();
    let bad = dir.path().join("bad-manifest.json");
    fs::write(&bad, b"{\"schema_version\":\"1\"}").unwrap();

    let err = Pruner::new(store.clone())
        .prune(&local_auth(), &[good, bad], false)
        .unwrap_err();
    assert!(matches!(err, PruneError::Manifest(_)));
    assert_eq!(store.blobs().count(), 2);
}

#[test]
fn blob_referenced_by_any_supplied_manifest_survives() {
    let (_dir, layout, store, first) = x_and_y();
    let second = RunManifestBuilder::new(
        layout.clone(),
        store.clone(),
        RunCategory::new("ga-verify").unwrap(),
        RunSha::new("abc").unwrap(),
    )
    .bytes(LogicalPath::new("y.txt").unwrap(), b"Y".to_vec())
    .build()
    .unwrap();
    let second = layout.manifest_path(&second.category, &second.sha);

    let report = Pruner::new(store.clone())
        .prune(&local_auth(), &[first, second], false)
        .unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(report.retained, 2);
}

#[test]
fn orphaned_temp_files_are_swept() {
    let (_dir, _layout, store, manifest) = x_and_y();
    let staged = evgate_cas::StagedFile::stage(
        &store.blob_path(&evgate_core::sha256_blob(b"Z")),
        b"Z",
    )
    .unwrap();
    std::mem::forget(staged);

    let report = Pruner::new(store.clone())
        .with_partial_min_age(Duration::ZERO)
        .prune(&local_auth(), &[manifest], false)
        .unwrap();
    assert_eq!(report.partials_removed.len(), 1);
}

#[test]
fn in_flight_put_survives_prune() {
    let (_dir, _layout, store, manifest) = x_and_y();
    let z = evgate_core::sha256_blob(b"Z");
    let inflight = evgate_cas::StagedFile::stage(&store.blob_path(&z), b"Z").unwrap();

    let report = Pruner::new(store.clone())
        .prune(&local_auth(), &[manifest], false)
        .unwrap();
    assert!(report.partials_removed.is_empty());
    assert!(inflight.temp_path().exists());

    inflight.commit().unwrap();
    assert_eq!(store.get_verified(&z).unwrap(), b"Z");
}
