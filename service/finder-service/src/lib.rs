//! Core engine: indexing orchestrator and hybrid search pipeline. Drives
//! the stores through a shared context; performs no UI work and no network
//! I/O.

pub mod aggregator;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod fusion;
pub mod offline;
pub mod orchestrator;
pub mod paths;
pub mod query;
pub mod reranker;
pub mod retriever;
pub mod settings;

use std::sync::{Arc, Mutex};

use embedding_provider::config::default_onnx_config;
use embedding_provider::embedder::{open_embedder, Embedder};
use embedding_provider::tokenizer::TextTokenizer;
use search_store::bm25::Bm25Store;
use search_store::manifest::ManifestStore;
use search_store::vector::VectorStore;

use crate::error::EngineError;
use crate::paths::AppDirs;
use crate::settings::AppSettings;

/// Process-wide stores and capability providers, passed explicitly to the
/// orchestrator and engine. Writers serialize through the orchestrator;
/// readers take the same locks per call and accept eventual consistency.
pub struct EngineContext {
    pub dirs: AppDirs,
    pub manifest: Mutex<ManifestStore>,
    pub vectors: Mutex<VectorStore>,
    pub bm25: Mutex<Bm25Store>,
    pub embedder: Arc<dyn Embedder>,
    pub tokenizer: Arc<TextTokenizer>,
    pub settings: Mutex<AppSettings>,
}

impl EngineContext {
    /// Open all stores under `dirs` with the default (ONNX or fallback)
    /// embedder, enforcing the schema-version guard first.
    pub fn open(dirs: AppDirs) -> Result<Arc<Self>, EngineError> {
        let (embedder, semantic) = open_embedder(default_onnx_config());
        Self::open_with_embedder(dirs, embedder, semantic)
    }

    /// Open with a caller-supplied embedder (tests, alternative providers).
    pub fn open_with_embedder(
        dirs: AppDirs,
        embedder: Arc<dyn Embedder>,
        semantic_model: bool,
    ) -> Result<Arc<Self>, EngineError> {
        dirs.ensure_schema_version()?;

        let manifest = ManifestStore::load(dirs.manifest_path());
        let vectors = VectorStore::open(dirs.chunks_db_path()).map_err(EngineError::store_write)?;
        let bm25 = Bm25Store::load(dirs.bm25_path());
        let tokenizer = Arc::new(TextTokenizer::new());

        let mut settings = AppSettings::load(&dirs.settings_path());
        settings.capabilities.korean_analyzer = tokenizer.korean_available();
        settings.capabilities.semantic_model = semantic_model;
        settings.capabilities.device = embedder.info().device.as_str().to_string();
        settings.save(&dirs.settings_path())?;

        Ok(Arc::new(Self {
            dirs,
            manifest: Mutex::new(manifest),
            vectors: Mutex::new(vectors),
            bm25: Mutex::new(bm25),
            embedder,
            tokenizer,
            settings: Mutex::new(settings),
        }))
    }
}

/// UTC epoch seconds as the floating-point stamp used across records.
pub(crate) fn now_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
