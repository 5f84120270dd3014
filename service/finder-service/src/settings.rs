//! Application settings with JSON persistence. A missing or corrupt file
//! yields defaults with a warning; writes are atomic.

use std::path::Path;

use search_model::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingSettings {
    pub max_file_size_mb: u64,
    pub skip_hidden_files: bool,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            skip_hidden_files: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Default mode name: FAST, SMART, or ASSIST.
    pub mode: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { mode: "SMART".into() }
    }
}

/// Runtime capability flags, recorded on startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub korean_analyzer: bool,
    pub semantic_model: bool,
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub schema_version: String,
    #[serde(default)]
    pub indexing: IndexingSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub indexed_folders: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            indexing: IndexingSettings::default(),
            search: SearchSettings::default(),
            capabilities: Capabilities::default(),
            indexed_folders: Vec::new(),
        }
    }
}

impl AppSettings {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(s) => s,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt settings, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json =
            serde_json::to_vec_pretty(self).map_err(|e| EngineError::StoreWrite(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");

        let missing = AppSettings::load(&path);
        assert_eq!(missing, AppSettings::default());
        assert_eq!(missing.search.mode, "SMART");

        let mut s = AppSettings::default();
        s.capabilities.korean_analyzer = true;
        s.indexed_folders.push("/docs".into());
        s.save(&path).unwrap();

        let back = AppSettings::load(&path);
        assert_eq!(back, s);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, b"{{{{").unwrap();
        assert_eq!(AppSettings::load(&path), AppSettings::default());
    }
}
