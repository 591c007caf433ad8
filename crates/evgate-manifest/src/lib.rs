//! # evgate-manifest — Run Manifests
//!
//! The `run-manifest.json` schema, the artifacts directory layout, and the
//! builder that turns a run's evidence files into CAS blobs plus one
//! deterministic manifest.
//!
//! Manifests are not content-addressed: they live at
//! `<artifacts>/<category>/<sha>/run-manifest.json` and may be rewritten when
//! a run is rebuilt. Only the blobs underneath are append-only.

pub mod builder;
pub mod error;
pub mod layout;
pub mod manifest;

pub use builder::{InputSource, RunInput, RunManifestBuilder};
pub use error::ManifestError;
pub use layout::{ArtifactLayout, CAS_DIR, MANIFEST_FILE_NAME};
pub use manifest::{FileEntry, RunManifest, SchemaVersion};
