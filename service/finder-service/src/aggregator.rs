//! File-level aggregation of fused document scores:
//! `file_score = max(scores) + α · mean(top_3(scores))`, α = 0.2, followed
//! by the ×0.4 decay for metadata-only files. Decay applies strictly after
//! aggregation, never before fusion.

use std::collections::HashMap;

use search_model::{ChunkId, FileId, FileRecord, MatchType};
use search_store::bm25::DocKind;

use crate::fusion::FusedDoc;

pub const ALPHA: f32 = 0.2;
pub const METADATA_ONLY_DECAY: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct FileAggregate {
    pub file_id: FileId,
    /// Pre-decay aggregate.
    pub file_score: f32,
    pub final_score: f32,
    pub match_type: MatchType,
    /// Chunk docs of this file, best first, for the evidence builder.
    pub top_chunks: Vec<(ChunkId, f32)>,
}

/// Group the fused pool per file and aggregate. Files without a persisted
/// record are dropped (nothing to render). Output is sorted by final score
/// descending with a deterministic tie-break.
pub fn aggregate(pool: &[FusedDoc], files: &HashMap<String, FileRecord>) -> Vec<FileAggregate> {
    let mut per_file: HashMap<&str, Vec<&FusedDoc>> = HashMap::new();
    for doc in pool {
        per_file.entry(doc.file_id.0.as_str()).or_default().push(doc);
    }

    let mut out = Vec::with_capacity(per_file.len());
    for (file_id, docs) in per_file {
        let Some(record) = files.get(file_id) else {
            continue;
        };

        let mut scores: Vec<f32> = docs.iter().map(|d| d.score).collect();
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let max = scores.first().copied().unwrap_or(0.0);
        let top3 = &scores[..scores.len().min(3)];
        let mean_top3 = top3.iter().sum::<f32>() / top3.len() as f32;
        let file_score = max + ALPHA * mean_top3;

        let final_score = if record.content_indexed {
            file_score
        } else {
            file_score * METADATA_ONLY_DECAY
        };

        let from_dense = docs.iter().any(|d| d.from_dense);
        let from_lexical = docs.iter().any(|d| d.from_lexical);
        let match_type = match (from_dense, from_lexical) {
            (true, true) => MatchType::Hybrid,
            (true, false) => MatchType::Semantic,
            _ => MatchType::Lexical,
        };

        let mut top_chunks: Vec<(ChunkId, f32)> = docs
            .iter()
            .filter(|d| d.kind == DocKind::Chunk)
            .map(|d| (ChunkId(d.doc_id.clone()), d.score))
            .collect();
        top_chunks.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0 .0.cmp(&b.0 .0))
        });

        out.push(FileAggregate {
            file_id: FileId(file_id.to_string()),
            file_score,
            final_score,
            match_type,
            top_chunks,
        });
    }

    out.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_id.0.cmp(&b.file_id.0))
    });
    out
}
