//! Dense and lexical retrievers. Either one failing degrades to an empty
//! result with a log line; the pipeline continues on the other.

use std::collections::HashSet;

use search_model::FileRecord;
use search_store::bm25::Bm25Hit;
use search_store::vector::VectorHit;
use tracing::warn;

use crate::query::ProcessedQuery;
use crate::EngineContext;

/// Over-fetch multiplier so post-retrieval filters still leave top-N.
const FETCH_FACTOR: usize = 4;

/// Search filters, applied uniformly to both retrievers.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Lowercase extensions including the dot, e.g. ".docx".
    pub extensions: Option<HashSet<String>>,
    pub modified_after: Option<f64>,
    pub modified_before: Option<f64>,
    pub folder_prefixes: Option<Vec<String>>,
}

impl SearchFilters {
    pub fn is_unrestricted(&self) -> bool {
        self.extensions.is_none()
            && self.modified_after.is_none()
            && self.modified_before.is_none()
            && self.folder_prefixes.is_none()
    }

    pub fn matches(&self, file: &FileRecord) -> bool {
        if let Some(exts) = &self.extensions {
            if !exts.contains(&file.extension) {
                return false;
            }
        }
        if let Some(after) = self.modified_after {
            if file.modified_at < after {
                return false;
            }
        }
        if let Some(before) = self.modified_before {
            if file.modified_at > before {
                return false;
            }
        }
        if let Some(prefixes) = &self.folder_prefixes {
            if !prefixes.iter().any(|p| file.path.starts_with(p.as_str())) {
                return false;
            }
        }
        true
    }
}

/// Vector-store search restricted to content-indexed chunks. `allowed`
/// holds the file ids surviving the filters, when any are active.
pub fn dense_retrieve(
    ctx: &EngineContext,
    query: &ProcessedQuery,
    top_n: usize,
    allowed: Option<&HashSet<String>>,
) -> Vec<VectorHit> {
    let fetch_n = top_n.saturating_mul(if allowed.is_some() { FETCH_FACTOR } else { 1 });
    let result = match ctx.vectors.lock() {
        Ok(store) => store.search(&query.embedding, fetch_n, true),
        Err(_) => {
            warn!("vector store lock poisoned, dense retrieval degraded to empty");
            return Vec::new();
        }
    };
    let mut hits = match result {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "dense retrieval failed, continuing with lexical only");
            return Vec::new();
        }
    };
    if let Some(allowed) = allowed {
        hits.retain(|h| allowed.contains(&h.file_id.0));
    }
    hits.truncate(top_n);
    hits
}

/// BM25 search over chunk and file docs. Metadata-only files can only
/// surface here, through their file-level doc.
pub fn lexical_retrieve(
    ctx: &EngineContext,
    query: &ProcessedQuery,
    top_n: usize,
    allowed: Option<&HashSet<String>>,
) -> Vec<Bm25Hit> {
    if query.tokens.is_empty() {
        return Vec::new();
    }
    let fetch_n = top_n.saturating_mul(if allowed.is_some() { FETCH_FACTOR } else { 1 });
    let mut hits = match ctx.bm25.lock() {
        Ok(mut store) => store.search(&query.tokens, fetch_n),
        Err(_) => {
            warn!("bm25 store lock poisoned, lexical retrieval degraded to empty");
            return Vec::new();
        }
    };
    if let Some(allowed) = allowed {
        hits.retain(|h| allowed.contains(&h.file_id.0));
    }
    hits.truncate(top_n);
    hits
}
