//! Search engine: query processing, both retrievers, RRF fusion, file
//! aggregation, and evidence building, returned as one `SearchResponse`.
//! Modes change knobs only; the pipeline is identical.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use search_model::{FileHit, FileRecord, SearchResponse};
use tracing::warn;

use crate::aggregator::aggregate;
use crate::error::EngineError;
use crate::evidence::build_evidences;
use crate::fusion::fuse;
use crate::query::process_query;
use crate::reranker;
use crate::retriever::{dense_retrieve, lexical_retrieve, SearchFilters};
use crate::EngineContext;

pub const MAX_RESULTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Fast,
    Smart,
    Assist,
}

#[derive(Debug, Clone, Copy)]
pub struct ModeKnobs {
    pub dense_top_n: usize,
    pub bm25_top_n: usize,
    pub evidences_per_file: usize,
    pub rerank: bool,
}

impl SearchMode {
    pub fn knobs(&self) -> ModeKnobs {
        match self {
            SearchMode::Fast => ModeKnobs {
                dense_top_n: 20,
                bm25_top_n: 20,
                evidences_per_file: 2,
                rerank: false,
            },
            SearchMode::Smart => ModeKnobs {
                dense_top_n: 50,
                bm25_top_n: 50,
                evidences_per_file: 3,
                rerank: false,
            },
            SearchMode::Assist => ModeKnobs {
                dense_top_n: 50,
                bm25_top_n: 50,
                evidences_per_file: 5,
                rerank: true,
            },
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "FAST" => Some(SearchMode::Fast),
            "SMART" => Some(SearchMode::Smart),
            "ASSIST" => Some(SearchMode::Assist),
            _ => None,
        }
    }
}

pub struct SearchEngine {
    ctx: Arc<EngineContext>,
}

impl SearchEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Run one query. Never returns an error: query-processing failures
    /// produce an empty response with a message, retriever failures degrade
    /// to the surviving source.
    pub fn search(&self, raw_query: &str, mode: SearchMode, filters: &SearchFilters) -> SearchResponse {
        let started = Instant::now();
        let knobs = mode.knobs();

        let query = match process_query(&self.ctx, raw_query) {
            Ok(q) => q,
            Err(e) => {
                return SearchResponse {
                    query: raw_query.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    results: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let files = self.load_file_map();
        let allowed: Option<HashSet<String>> = if filters.is_unrestricted() {
            None
        } else {
            Some(
                files
                    .values()
                    .filter(|f| filters.matches(f))
                    .map(|f| f.file_id.0.clone())
                    .collect(),
            )
        };

        let dense = dense_retrieve(&self.ctx, &query, knobs.dense_top_n, allowed.as_ref());
        let lexical = lexical_retrieve(&self.ctx, &query, knobs.bm25_top_n, allowed.as_ref());

        let dense_scores: HashMap<String, f32> = dense
            .iter()
            .map(|h| (h.chunk_id.0.clone(), h.score))
            .collect();
        let lexical_scores: HashMap<String, f32> =
            lexical.iter().map(|h| (h.doc_id.clone(), h.score)).collect();

        let pool = fuse(&dense, &lexical);
        let mut aggregates = aggregate(&pool, &files);
        aggregates.truncate(MAX_RESULTS);

        let mut results: Vec<FileHit> = Vec::with_capacity(aggregates.len());
        {
            let vectors = match self.ctx.vectors.lock() {
                Ok(g) => Some(g),
                Err(_) => {
                    warn!("vector store lock poisoned, returning results without evidences");
                    None
                }
            };
            for agg in &aggregates {
                let Some(record) = files.get(&agg.file_id.0) else {
                    continue;
                };
                let evidences = match (&vectors, record.content_indexed) {
                    (Some(store), true) => build_evidences(
                        store,
                        agg,
                        &query.text,
                        &query.tokens,
                        &dense_scores,
                        &lexical_scores,
                        knobs.evidences_per_file,
                    ),
                    _ => Vec::new(),
                };
                results.push(FileHit {
                    file: record.clone(),
                    score: agg.final_score,
                    match_type: agg.match_type,
                    content_available: record.content_indexed,
                    evidences,
                });
            }
            if knobs.rerank {
                if let Some(store) = &vectors {
                    reranker::rerank(store, &query.embedding, &aggregates, &mut results);
                }
            }
        }

        SearchResponse {
            query: query.text,
            elapsed_ms: started.elapsed().as_millis() as u64,
            results,
            error: None,
        }
    }

    fn load_file_map(&self) -> HashMap<String, FileRecord> {
        let listed = match self.ctx.vectors.lock() {
            Ok(store) => store.list_files().map_err(EngineError::store_read),
            Err(_) => Err(EngineError::StoreRead("vector store lock poisoned".into())),
        };
        match listed {
            Ok(files) => files.into_iter().map(|f| (f.file_id.0.clone(), f)).collect(),
            Err(e) => {
                warn!(error = %e, "could not list file records");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_knob_table_matches_release_presets() {
        let fast = SearchMode::Fast.knobs();
        assert_eq!((fast.dense_top_n, fast.bm25_top_n, fast.evidences_per_file, fast.rerank),
                   (20, 20, 2, false));
        let smart = SearchMode::Smart.knobs();
        assert_eq!((smart.dense_top_n, smart.bm25_top_n, smart.evidences_per_file, smart.rerank),
                   (50, 50, 3, false));
        let assist = SearchMode::Assist.knobs();
        assert_eq!((assist.dense_top_n, assist.bm25_top_n, assist.evidences_per_file, assist.rerank),
                   (50, 50, 5, true));
    }

    #[test]
    fn mode_names_parse_case_insensitively() {
        assert_eq!(SearchMode::from_name("smart"), Some(SearchMode::Smart));
        assert_eq!(SearchMode::from_name("ASSIST"), Some(SearchMode::Assist));
        assert_eq!(SearchMode::from_name("turbo"), None);
    }

    #[test]
    fn result_cap_is_fifty() {
        assert_eq!(MAX_RESULTS, 50);
    }
}
