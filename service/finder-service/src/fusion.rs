//! Reciprocal Rank Fusion over the two retriever pools. Each document
//! (chunk doc or file doc) accumulates `1/(k + rank)` per source it appears
//! in, ranks 1-based, `k = 60`. A source missing for a document simply
//! contributes nothing; one source alone is acceptable.

use std::collections::HashMap;

use search_model::FileId;
use search_store::bm25::{Bm25Hit, DocKind};
use search_store::vector::VectorHit;

pub const RRF_K: f32 = 60.0;

/// One fused document with its summed RRF contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedDoc {
    pub doc_id: String,
    pub file_id: FileId,
    pub kind: DocKind,
    pub score: f32,
    pub from_dense: bool,
    pub from_lexical: bool,
}

pub fn fuse(dense: &[VectorHit], lexical: &[Bm25Hit]) -> Vec<FusedDoc> {
    let mut pool: HashMap<String, FusedDoc> = HashMap::new();

    for (i, hit) in dense.iter().enumerate() {
        let rank = (i + 1) as f32;
        let entry = pool.entry(hit.chunk_id.0.clone()).or_insert_with(|| FusedDoc {
            doc_id: hit.chunk_id.0.clone(),
            file_id: hit.file_id.clone(),
            kind: DocKind::Chunk,
            score: 0.0,
            from_dense: false,
            from_lexical: false,
        });
        entry.score += 1.0 / (RRF_K + rank);
        entry.from_dense = true;
    }

    for (i, hit) in lexical.iter().enumerate() {
        let rank = (i + 1) as f32;
        let entry = pool.entry(hit.doc_id.clone()).or_insert_with(|| FusedDoc {
            doc_id: hit.doc_id.clone(),
            file_id: hit.file_id.clone(),
            kind: hit.kind,
            score: 0.0,
            from_dense: false,
            from_lexical: false,
        });
        entry.score += 1.0 / (RRF_K + rank);
        entry.from_lexical = true;
    }

    let mut out: Vec<FusedDoc> = pool.into_values().collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    out
}
