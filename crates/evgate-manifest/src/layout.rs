//! # Artifacts Layout
//!
//! Path arithmetic for the artifacts tree:
//!
//! ```text
//! <root>/cas/sha256/<aa>/<bb>/<digest>.blob
//! <root>/<category>/<sha>/run-manifest.json
//! ```
//!
//! The root is always injected, never read from a global, so every test can
//! point the whole engine at a temporary directory.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use evgate_cas::ContentAddressedStore;
use evgate_core::{RunCategory, RunSha};

/// Directory under the artifacts root holding the CAS.
pub const CAS_DIR: &str = "cas";

/// File name of every run manifest.
pub const MANIFEST_FILE_NAME: &str = "run-manifest.json";

/// The artifacts tree rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/cas`.
    pub fn cas_root(&self) -> PathBuf {
        self.root.join(CAS_DIR)
    }

    /// A store over [`cas_root()`](Self::cas_root) using the default writer.
    pub fn store(&self) -> ContentAddressedStore {
        ContentAddressedStore::new(self.cas_root())
    }

    /// `<root>/<category>/<sha>`.
    pub fn run_dir(&self, category: &RunCategory, sha: &RunSha) -> PathBuf {
        category
            .segments()
            .fold(self.root.clone(), |acc, seg| acc.join(seg))
            .join(sha.as_str())
    }

    /// `<root>/<category>/<sha>/run-manifest.json`.
    pub fn manifest_path(&self, category: &RunCategory, sha: &RunSha) -> PathBuf {
        self.run_dir(category, sha).join(MANIFEST_FILE_NAME)
    }

    /// Recover the `(category, sha)` a manifest path sits under.
    ///
    /// Returns `None` when the path is outside the root or is not named
    /// `run-manifest.json` at least two levels deep. The strings are not
    /// validated; callers compare them against the manifest's own fields.
    pub fn locate(&self, manifest_path: &Path) -> Option<(String, String)> {
        let rel = manifest_path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(os) => parts.push(os.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        let (file, rest) = parts.split_last()?;
        if *file != MANIFEST_FILE_NAME {
            return None;
        }
        let (sha, category) = rest.split_last()?;
        if category.is_empty() {
            return None;
        }
        Some((category.join("/"), (*sha).to_string()))
    }

    /// Every `run-manifest.json` under the root, skipping the CAS, in path
    /// order. An absent root yields nothing.
    ///
    /// The walk is lazy and does not stop at an unreadable directory: each
    /// walk error is yielded in place and the remaining entries follow.
    pub fn discover_manifests(&self) -> impl Iterator<Item = Result<PathBuf, walkdir::Error>> {
        let cas_root = self.cas_root();
        let walker = self.root.is_dir().then(|| {
            walkdir::WalkDir::new(&self.root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(move |e| e.path() != cas_root.as_path())
        });
        walker.into_iter().flatten().filter_map(|entry| match entry {
            Ok(e)
                if e.file_type().is_file()
                    && e.file_name() == OsStr::new(MANIFEST_FILE_NAME) =>
            {
                Some(Ok(e.into_path()))
            }
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ArtifactLayout {
        ArtifactLayout::new("/srv/artifacts")
    }

    #[test]
    fn manifest_path_for_flat_category() {
        let category = RunCategory::new("evidence").unwrap();
        let sha = RunSha::new("deadbeef").unwrap();
        assert_eq!(
            layout().manifest_path(&category, &sha),
            PathBuf::from("/srv/artifacts/evidence/deadbeef/run-manifest.json")
        );
    }

    #[test]
    fn manifest_path_for_namespaced_category() {
        let category = RunCategory::new("governance/sbom").unwrap();
        let sha = RunSha::new("abc123").unwrap();
        assert_eq!(
            layout().manifest_path(&category, &sha),
            PathBuf::from("/srv/artifacts/governance/sbom/abc123/run-manifest.json")
        );
    }

    #[test]
    fn cas_root_is_under_artifacts() {
        assert_eq!(layout().cas_root(), PathBuf::from("/srv/artifacts/cas"));
    }

    #[test]
    fn locate_inverts_manifest_path() {
        let category = RunCategory::new("governance/sbom").unwrap();
        let sha = RunSha::new("abc123").unwrap();
        let path = layout().manifest_path(&category, &sha);
        assert_eq!(
            layout().locate(&path),
            Some(("governance/sbom".to_string(), "abc123".to_string()))
        );
    }

    #[test]
    fn locate_rejects_foreign_paths() {
        let l = layout();
        assert_eq!(l.locate(Path::new("/tmp/run-manifest.json")), None);
        assert_eq!(l.locate(Path::new("/srv/artifacts/run-manifest.json")), None);
        assert_eq!(l.locate(Path::new("/srv/artifacts/x/run-manifest.json")), None);
        assert_eq!(l.locate(Path::new("/srv/artifacts/a/b/other.json")), None);
    }

    #[test]
    fn discover_skips_cas_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let l = ArtifactLayout::new(dir.path());
        let wanted = [
            dir.path().join("evidence/aaa/run-manifest.json"),
            dir.path().join("ga-verify/bbb/run-manifest.json"),
        ];
        for p in &wanted {
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, b"{}").unwrap();
        }
        let decoy = dir.path().join("cas/sha256/run-manifest.json");
        std::fs::create_dir_all(decoy.parent().unwrap()).unwrap();
        std::fs::write(&decoy, b"{}").unwrap();
        std::fs::write(dir.path().join("evidence/aaa/notes.txt"), b"x").unwrap();

        let found: Vec<_> = l.discover_manifests().collect::<Result<_, _>>().unwrap();
        assert_eq!(found, wanted.to_vec());
    }

    #[test]
    fn discover_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let l = ArtifactLayout::new(dir.path().join("missing"));
        assert_eq!(l.discover_manifests().count(), 0);
    }
}
