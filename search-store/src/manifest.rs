//! Persistent map from absolute path to `{file_id, fingerprint,
//! last_indexed_at}`. The single authoritative source of incremental state.

use std::path::{Path, PathBuf};

use search_model::{Manifest, ManifestEntry, ScannedFile, SCHEMA_VERSION};
use tracing::warn;

use crate::{write_atomic, StoreError};

/// Result of comparing a scan against the manifest.
#[derive(Debug, Default)]
pub struct ManifestDiff {
    pub added: Vec<ScannedFile>,
    pub changed: Vec<ScannedFile>,
    /// Paths present in the manifest but absent from the scan.
    pub removed: Vec<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

pub struct ManifestStore {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestStore {
    /// Load the manifest at `path`. A missing file starts empty; a corrupt
    /// file is treated as empty (forcing a full reindex) with a warning.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let manifest = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Manifest>(&text) {
                Ok(m) if m.schema_version == SCHEMA_VERSION => m,
                Ok(m) => {
                    warn!(
                        found = %m.schema_version,
                        "manifest schema version mismatch, starting empty"
                    );
                    Manifest::default()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt manifest, starting empty");
                    Manifest::default()
                }
            },
            Err(_) => Manifest::default(),
        };
        Self { path, manifest }
    }

    /// Persist atomically (temp file + rename).
    pub fn save(&mut self, now: f64) -> Result<(), StoreError> {
        self.manifest.last_updated_at = now;
        let json = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        write_atomic(&self.path, &json)
    }

    /// Compare the scanned files against the manifest. A file counts as
    /// changed iff any fingerprint component differs.
    pub fn diff(&self, scanned: &[ScannedFile]) -> ManifestDiff {
        let mut out = ManifestDiff::default();
        let mut seen = std::collections::HashSet::new();
        for file in scanned {
            seen.insert(file.path.as_str());
            match self.manifest.files.get(&file.path) {
                None => out.added.push(file.clone()),
                Some(entry) => {
                    if entry.fingerprint.differs_from(&file.fingerprint()) {
                        out.changed.push(file.clone());
                    }
                }
            }
        }
        for path in self.manifest.files.keys() {
            if !seen.contains(path.as_str()) {
                out.removed.push(path.clone());
            }
        }
        out
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.manifest.files.get(path)
    }

    pub fn set(&mut self, path: String, entry: ManifestEntry) {
        self.manifest.files.insert(path, entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<ManifestEntry> {
        self.manifest.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.manifest.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.files.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.manifest.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_model::{FileId, Fingerprint};

    fn scanned(path: &str, size: u64, mtime: f64) -> ScannedFile {
        ScannedFile {
            path: path.into(),
            filename: path.rsplit('/').next().unwrap_or(path).into(),
            extension: ".md".into(),
            size_bytes: size,
            created_at: mtime,
            modified_at: mtime,
        }
    }

    fn entry_for(file: &ScannedFile) -> ManifestEntry {
        ManifestEntry {
            file_id: FileId::generate(),
            fingerprint: file.fingerprint(),
            last_indexed_at: 1.0,
            content_indexed: true,
        }
    }

    #[test]
    fn diff_reports_added_changed_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::load(tmp.path().join("manifest.json"));

        let kept = scanned("/docs/kept.md", 10, 100.0);
        let gone = scanned("/docs/gone.md", 10, 100.0);
        store.set(kept.path.clone(), entry_for(&kept));
        store.set(gone.path.clone(), entry_for(&gone));

        let touched = scanned("/docs/kept.md", 10, 200.0);
        let fresh = scanned("/docs/new.md", 5, 50.0);
        let diff = store.diff(&[touched, fresh]);

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].path, "/docs/new.md");
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].path, "/docs/kept.md");
        assert_eq!(diff.removed, vec!["/docs/gone.md".to_string()]);
    }

    #[test]
    fn unchanged_scan_produces_empty_diff() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::load(tmp.path().join("manifest.json"));
        let file = scanned("/docs/a.md", 10, 100.0);
        store.set(file.path.clone(), entry_for(&file));
        assert!(store.diff(&[file]).is_empty());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");
        let file = scanned("/docs/a.md", 10, 100.0);
        {
            let mut store = ManifestStore::load(&path);
            store.set(file.path.clone(), entry_for(&file));
            store.save(123.0).unwrap();
        }
        let store = ManifestStore::load(&path);
        assert_eq!(store.len(), 1);
        assert!(store.get("/docs/a.md").is_some());
        // No stray temp file left behind.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_manifest_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("manifest.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = ManifestStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn hash_component_triggers_change() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ManifestStore::load(tmp.path().join("manifest.json"));
        let file = scanned("/docs/a.md", 10, 100.0);
        let mut entry = entry_for(&file);
        entry.fingerprint = Fingerprint {
            hash: Some("abc".into()),
            ..file.fingerprint()
        };
        store.set(file.path.clone(), entry);
        // The scan carries no hash, so the fingerprint differs.
        let diff = store.diff(&[file]);
        assert_eq!(diff.changed.len(), 1);
    }
}
