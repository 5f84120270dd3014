//! Optional ASSIST-mode reranker. Local and deterministic: blends the
//! fused file score with the exact cosine between the query embedding and
//! the file's best stored chunk vector, then reorders. Response scores are
//! left untouched; only the ordering changes. Files without chunks keep
//! their fused standing.

use std::collections::HashMap;

use search_model::FileHit;
use search_store::vector::VectorStore;
use tracing::warn;

use crate::aggregator::FileAggregate;

const COSINE_WEIGHT: f32 = 0.5;

pub fn rerank(
    vectors: &VectorStore,
    query_embedding: &[f32],
    aggregates: &[FileAggregate],
    hits: &mut [FileHit],
) {
    if hits.is_empty() || query_embedding.is_empty() {
        return;
    }

    // Exact cosine for each file's single best chunk.
    let best_chunk_ids: Vec<_> = aggregates
        .iter()
        .filter_map(|a| a.top_chunks.first().map(|(id, _)| (a.file_id.0.clone(), id.clone())))
        .collect();
    let records = match vectors.get_chunks_by_ids(
        &best_chunk_ids.iter().map(|(_, id)| id.clone()).collect::<Vec<_>>(),
    ) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "reranker could not read chunk vectors, keeping fused order");
            return;
        }
    };
    let mut cosine_by_file: HashMap<String, f32> = HashMap::new();
    for rec in &records {
        cosine_by_file.insert(rec.file_id.0.clone(), cosine(query_embedding, &rec.embedding));
    }

    let max_fused = hits
        .iter()
        .map(|h| h.score)
        .fold(0.0f32, f32::max)
        .max(f32::EPSILON);
    let blended: HashMap<String, f32> = hits
        .iter()
        .map(|h| {
            let fused = h.score / max_fused;
            let score = match cosine_by_file.get(&h.file.file_id.0) {
                Some(cos) => (1.0 - COSINE_WEIGHT) * fused + COSINE_WEIGHT * cos.max(0.0),
                None => (1.0 - COSINE_WEIGHT) * fused,
            };
            (h.file.file_id.0.clone(), score)
        })
        .collect();

    hits.sort_by(|a, b| {
        let sa = blended.get(&a.file.file_id.0).copied().unwrap_or(0.0);
        let sb = blended.get(&b.file.file_id.0).copied().unwrap_or(0.0);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file.file_id.0.cmp(&b.file.file_id.0))
    });
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}
