//! App-data directory resolution and the on-disk layout:
//!
//! ```text
//! LocalFinderX/
//!   data/{manifest.json, chunks.db, bm25.bin, schema_version.json}
//!   logs/indexing_errors.log
//!   config/settings.json
//! ```

use std::path::{Path, PathBuf};

use search_model::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const APP_DIR_NAME: &str = "LocalFinderX";
/// Environment override, checked before the platform default.
pub const DATA_DIR_ENV: &str = "LOCAL_FINDER_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaVersionFile {
    schema_version: String,
}

#[derive(Debug, Clone)]
pub struct AppDirs {
    root: PathBuf,
}

impl AppDirs {
    /// Resolve the app-data root, in priority order: an explicit path, the
    /// `LOCAL_FINDER_DATA_DIR` environment variable, the platform default.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, EngineError> {
        let root = if let Some(p) = explicit {
            p.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV) {
            PathBuf::from(val)
        } else {
            platform_default()?
        };
        let dirs = Self { root };
        dirs.ensure_layout()?;
        Ok(dirs)
    }

    /// Use an explicit root (tests and embedding applications).
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dirs = Self { root: root.into() };
        dirs.ensure_layout()?;
        Ok(dirs)
    }

    fn ensure_layout(&self) -> Result<(), EngineError> {
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.config_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir().join("manifest.json")
    }

    pub fn chunks_db_path(&self) -> PathBuf {
        self.data_dir().join("chunks.db")
    }

    pub fn bm25_path(&self) -> PathBuf {
        self.data_dir().join("bm25.bin")
    }

    pub fn schema_version_path(&self) -> PathBuf {
        self.data_dir().join("schema_version.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.logs_dir().join("indexing_errors.log")
    }

    /// Enforce the schema guard: a fresh data directory gets stamped with
    /// the current version; a stamp from another version refuses to open.
    pub fn ensure_schema_version(&self) -> Result<(), EngineError> {
        let path = self.schema_version_path();
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let found = serde_json::from_str::<SchemaVersionFile>(&text)
                    .map(|f| f.schema_version)
                    .unwrap_or_else(|_| "unknown".to_string());
                if found != SCHEMA_VERSION {
                    return Err(EngineError::SchemaMismatch { found });
                }
                Ok(())
            }
            Err(_) => {
                let stamp = SchemaVersionFile {
                    schema_version: SCHEMA_VERSION.to_string(),
                };
                let json = serde_json::to_vec_pretty(&stamp)
                    .map_err(|e| EngineError::StoreWrite(e.to_string()))?;
                let tmp = path.with_extension("tmp");
                std::fs::write(&tmp, &json)?;
                std::fs::rename(&tmp, &path)?;
                Ok(())
            }
        }
    }
}

fn platform_default() -> Result<PathBuf, EngineError> {
    #[cfg(target_os = "windows")]
    {
        let base = std::env::var("APPDATA")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("USERPROFILE").map(PathBuf::from))
            .map_err(|_| EngineError::Io(std::io::Error::other("no APPDATA or USERPROFILE")))?;
        Ok(base.join(APP_DIR_NAME))
    }
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| EngineError::Io(std::io::Error::other("no HOME")))?;
        Ok(home.join("Library").join("Application Support").join(APP_DIR_NAME))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = match std::env::var("XDG_DATA_HOME") {
            Ok(v) => PathBuf::from(v),
            Err(_) => {
                let home = std::env::var("HOME")
                    .map(PathBuf::from)
                    .map_err(|_| EngineError::Io(std::io::Error::other("no HOME")))?;
                home.join(".local").join("share")
            }
        };
        Ok(base.join(APP_DIR_NAME))
    }
}
