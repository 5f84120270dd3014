//! Evidence builder: per file, pick the best chunks by fused score with a
//! preference for distinct locations, and cut a 200-500 char snippet around
//! the densest token-match region with highlight spans.

use std::collections::{HashMap, HashSet};

use search_model::{ChunkId, ChunkRecord, Evidence, EvidenceScores, HighlightSpan};
use search_store::vector::VectorStore;
use tracing::warn;

use crate::aggregator::FileAggregate;

pub const SNIPPET_MIN_CHARS: usize = 200;
pub const SNIPPET_MAX_CHARS: usize = 500;
/// Window used when the text carries no token match at all.
const PLAIN_SNIPPET_CHARS: usize = 300;
/// Context kept ahead of the first match in the window.
const LEAD_CONTEXT_CHARS: usize = 40;

/// Build up to `max_evidences` evidences for one aggregated file.
/// Metadata-only files have no chunk docs and therefore get none.
pub fn build_evidences(
    vectors: &VectorStore,
    agg: &FileAggregate,
    query_text: &str,
    query_tokens: &[String],
    dense_scores: &HashMap<String, f32>,
    lexical_scores: &HashMap<String, f32>,
    max_evidences: usize,
) -> Vec<Evidence> {
    if agg.top_chunks.is_empty() || max_evidences == 0 {
        return Vec::new();
    }

    let candidate_ids: Vec<ChunkId> = agg
        .top_chunks
        .iter()
        .take(max_evidences * 3)
        .map(|(id, _)| id.clone())
        .collect();
    let records = match vectors.get_chunks_by_ids(&candidate_ids) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "could not materialize evidence chunks");
            return Vec::new();
        }
    };
    let score_of: HashMap<&str, f32> = agg
        .top_chunks
        .iter()
        .map(|(id, s)| (id.0.as_str(), *s))
        .collect();

    // Descending fused score, ties broken by chunk_index.
    let mut candidates: Vec<&ChunkRecord> = records.iter().collect();
    candidates.sort_by(|a, b| {
        let sa = score_of.get(a.chunk_id.0.as_str()).copied().unwrap_or(0.0);
        let sb = score_of.get(b.chunk_id.0.as_str()).copied().unwrap_or(0.0);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });

    // First pass keeps distinct locations; a second pass fills leftover
    // slots in score order.
    let mut picked: Vec<&ChunkRecord> = Vec::new();
    let mut seen_locations: HashSet<String> = HashSet::new();
    for &rec in &candidates {
        if picked.len() >= max_evidences {
            break;
        }
        if seen_locations.insert(rec.location.distinct_key()) {
            picked.push(rec);
        }
    }
    for &rec in &candidates {
        if picked.len() >= max_evidences {
            break;
        }
        if !picked.iter().any(|p| p.chunk_id == rec.chunk_id) {
            picked.push(rec);
        }
    }

    picked
        .into_iter()
        .map(|rec| {
            let (snippet, highlights) = build_snippet(&rec.text, query_tokens);
            Evidence {
                evidence_id: uuid::Uuid::new_v4().to_string(),
                file_id: rec.file_id.clone(),
                summary: format!("This section most closely matches '{query_text}'."),
                snippet,
                highlights,
                scores: EvidenceScores {
                    final_score: score_of.get(rec.chunk_id.0.as_str()).copied().unwrap_or(0.0),
                    dense: dense_scores.get(rec.chunk_id.0.as_str()).copied().unwrap_or(0.0),
                    lexical: lexical_scores
                        .get(rec.chunk_id.0.as_str())
                        .copied()
                        .unwrap_or(0.0),
                },
                location: rec.location.clone(),
            }
        })
        .collect()
}

/// Cut a snippet of 200-500 chars around the densest token-match region and
/// return byte-offset highlight spans relative to the snippet.
pub fn build_snippet(text: &str, query_tokens: &[String]) -> (String, Vec<HighlightSpan>) {
    let chars: Vec<char> = text.chars().collect();
    let occurrences = find_occurrences(&chars, query_tokens);

    let (start, end) = if chars.len() <= SNIPPET_MAX_CHARS {
        (0, chars.len())
    } else if occurrences.is_empty() {
        (0, PLAIN_SNIPPET_CHARS.min(chars.len()))
    } else {
        densest_window(&occurrences, chars.len())
    };

    let snippet: String = chars[start..end].iter().collect();
    // Prefix byte offsets into the snippet for each window char position.
    let mut byte_at = Vec::with_capacity(end - start + 1);
    let mut acc = 0usize;
    for ch in &chars[start..end] {
        byte_at.push(acc);
        acc += ch.len_utf8();
    }
    byte_at.push(acc);

    let highlights = occurrences
        .iter()
        .filter(|(occ_start, occ_len)| *occ_start >= start && occ_start + occ_len <= end)
        .map(|(occ_start, occ_len)| HighlightSpan {
            start: byte_at[occ_start - start],
            end: byte_at[occ_start - start + occ_len],
        })
        .collect();

    (snippet, highlights)
}

/// Case-insensitive character-level occurrences of every query token,
/// sorted by position.
fn find_occurrences(chars: &[char], query_tokens: &[String]) -> Vec<(usize, usize)> {
    let lower: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();
    let mut out = Vec::new();
    for token in query_tokens {
        let needle: Vec<char> = token
            .chars()
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect();
        if needle.is_empty() || needle.len() > lower.len() {
            continue;
        }
        for start in 0..=(lower.len() - needle.len()) {
            if lower[start..start + needle.len()] == needle[..] {
                out.push((start, needle.len()));
            }
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Pick the window of `SNIPPET_MAX_CHARS` covering the most occurrences,
/// then pad it to at least `SNIPPET_MIN_CHARS`.
fn densest_window(occurrences: &[(usize, usize)], text_len: usize) -> (usize, usize) {
    let mut best_i = 0;
    let mut best_count = 0;
    for i in 0..occurrences.len() {
        let window_end = occurrences[i].0 + SNIPPET_MAX_CHARS;
        let count = occurrences[i..]
            .iter()
            .take_while(|(s, l)| s + l <= window_end)
            .count();
        if count > best_count {
            best_count = count;
            best_i = i;
        }
    }
    let anchor = occurrences[best_i].0;
    let start = anchor.saturating_sub(LEAD_CONTEXT_CHARS);
    let mut end = (start + SNIPPET_MAX_CHARS).min(text_len);
    let mut start = start.min(end.saturating_sub(SNIPPET_MIN_CHARS));
    if end - start < SNIPPET_MIN_CHARS {
        end = (start + SNIPPET_MIN_CHARS).min(text_len);
        start = end.saturating_sub(SNIPPET_MIN_CHARS.min(text_len));
    }
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_bounds_are_respected() {
        let filler = "가나다라마바사아자차카타파하 ".repeat(200);
        let text = format!("{filler}핵심 비용 조정 문장입니다 {filler}");
        let tokens = vec!["비용".to_string(), "조정".to_string()];
        let (snippet, highlights) = build_snippet(&text, &tokens);
        let n = snippet.chars().count();
        assert!((SNIPPET_MIN_CHARS..=SNIPPET_MAX_CHARS).contains(&n), "snippet was {n} chars");
        assert!(!highlights.is_empty());
        for h in &highlights {
            assert!(h.end <= snippet.len());
            let covered = &snippet[h.start..h.end];
            assert!(covered == "비용" || covered == "조정", "highlighted {covered:?}");
        }
    }

    #[test]
    fn short_text_is_returned_whole() {
        let (snippet, highlights) = build_snippet("비용 조정", &["조정".to_string()]);
        assert_eq!(snippet, "비용 조정");
        assert_eq!(highlights.len(), 1);
        assert_eq!(&snippet[highlights[0].start..highlights[0].end], "조정");
    }

    #[test]
    fn no_match_yields_leading_window_without_highlights() {
        let text = "x".repeat(2000);
        let (snippet, highlights) = build_snippet(&text, &["없는말".to_string()]);
        assert_eq!(snippet.chars().count(), PLAIN_SNIPPET_CHARS);
        assert!(highlights.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let (_, highlights) = build_snippet("The BUDGET report", &["budget".to_string()]);
        assert_eq!(highlights.len(), 1);
    }

    #[test]
    fn window_centers_on_densest_region() {
        let sparse = format!("비용 {}", "x".repeat(1000));
        let dense = "비용 비용 비용";
        let text = format!("{sparse}{dense}{}", "y".repeat(1000));
        let (snippet, _) = build_snippet(&text, &["비용".to_string()]);
        // The dense cluster, not the lone leading match, should be inside.
        assert!(snippet.contains("비용 비용 비용"));
    }
}
