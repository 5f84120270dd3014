//! Error taxonomy of the engine. Per-file and per-chunk problems are
//! captured and counted by the orchestrator; only the variants below
//! surface to callers. User-visible messages stay plain and specific.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not read this file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not extract content: {0}")]
    Extraction(String),
    #[error("could not compute embeddings: {0}")]
    Embedding(String),
    #[error("could not write to the index: {0}")]
    StoreWrite(String),
    #[error("could not read the index: {0}")]
    StoreRead(String),
    #[error("{0}")]
    Query(String),
    #[error("index data was written by version {found}; please reindex")]
    SchemaMismatch { found: String },
    #[error("the offline guarantee would be violated: {0}")]
    Offline(String),
    #[error("operation was cancelled")]
    Cancelled,
}

impl EngineError {
    pub(crate) fn store_write(e: search_store::StoreError) -> Self {
        match e {
            search_store::StoreError::SchemaMismatch { found, .. } => {
                EngineError::SchemaMismatch { found }
            }
            other => EngineError::StoreWrite(other.to_string()),
        }
    }

    pub(crate) fn store_read(e: search_store::StoreError) -> Self {
        match e {
            search_store::StoreError::SchemaMismatch { found, .. } => {
                EngineError::SchemaMismatch { found }
            }
            other => EngineError::StoreRead(other.to_string()),
        }
    }
}
