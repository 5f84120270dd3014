//! Persistent Okapi BM25 index over two document kinds sharing one corpus:
//! chunk docs for content-indexed files and file docs (name/path/author
//! tokens) for every file. Snapshot format is bincode at `bm25.bin`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use search_model::{ChunkId, FileId, SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{write_atomic, StoreError};

const K1: f32 = 1.5;
const B: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Chunk,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bm25Doc {
    doc_id: String,
    file_id: String,
    kind: DocKind,
    tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bm25Snapshot {
    schema_version: String,
    docs: Vec<Bm25Doc>,
}

impl Default for Bm25Snapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            docs: Vec::new(),
        }
    }
}

/// One lexical hit. `doc_id` equals the chunk id for chunk docs and the
/// file id for file docs.
#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Hit {
    pub doc_id: String,
    pub file_id: FileId,
    pub kind: DocKind,
    pub score: f32,
}

/// Corpus statistics derived from the documents; rebuilt after mutations.
#[derive(Debug, Default)]
struct Bm25Stats {
    doc_freq: HashMap<String, u32>,
    avg_doc_len: f32,
}

pub struct Bm25Store {
    path: PathBuf,
    snapshot: Bm25Snapshot,
    stats: Bm25Stats,
    stats_dirty: bool,
}

impl Bm25Store {
    /// Load the snapshot at `path`. Missing file starts empty; a corrupt or
    /// version-mismatched snapshot is discarded with a warning.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let snapshot = match std::fs::read(&path) {
            Ok(bytes) => match bincode::deserialize::<Bm25Snapshot>(&bytes) {
                Ok(s) if s.schema_version == SCHEMA_VERSION => s,
                Ok(s) => {
                    warn!(found = %s.schema_version, "bm25 snapshot version mismatch, starting empty");
                    Bm25Snapshot::default()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt bm25 snapshot, starting empty");
                    Bm25Snapshot::default()
                }
            },
            Err(_) => Bm25Snapshot::default(),
        };
        let mut store = Self {
            path,
            snapshot,
            stats: Bm25Stats::default(),
            stats_dirty: true,
        };
        store.rebuild_stats();
        store
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let bytes = bincode::serialize(&self.snapshot)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        write_atomic(&self.path, &bytes)
    }

    /// Index a chunk-level document. Empty token lists are skipped; they
    /// would never score anyway.
    pub fn index_chunk(&mut self, chunk_id: &ChunkId, file_id: &FileId, tokens: Vec<String>) {
        self.insert(chunk_id.0.clone(), file_id.0.clone(), DocKind::Chunk, tokens);
    }

    /// Index the file-level document (filename/path/author tokens). Every
    /// file gets one, metadata-only files included.
    pub fn index_file(&mut self, file_id: &FileId, tokens: Vec<String>) {
        self.insert(file_id.0.clone(), file_id.0.clone(), DocKind::File, tokens);
    }

    fn insert(&mut self, doc_id: String, file_id: String, kind: DocKind, tokens: Vec<String>) {
        if tokens.is_empty() {
            return;
        }
        self.snapshot.docs.retain(|d| d.doc_id != doc_id);
        self.snapshot.docs.push(Bm25Doc {
            doc_id,
            file_id,
            kind,
            tokens,
        });
        self.stats_dirty = true;
    }

    /// Remove every document (both kinds) belonging to a file. Idempotent.
    pub fn remove_file(&mut self, file_id: &FileId) -> usize {
        let before = self.snapshot.docs.len();
        self.snapshot.docs.retain(|d| d.file_id != file_id.0);
        let removed = before - self.snapshot.docs.len();
        if removed > 0 {
            self.stats_dirty = true;
        }
        removed
    }

    pub fn doc_count(&self) -> usize {
        self.snapshot.docs.len()
    }

    /// Distinct file ids with at least one document of either kind.
    pub fn file_ids(&self) -> Vec<FileId> {
        let mut seen = std::collections::HashSet::new();
        self.snapshot
            .docs
            .iter()
            .filter(|d| seen.insert(d.file_id.as_str()))
            .map(|d| FileId(d.file_id.clone()))
            .collect()
    }

    fn rebuild_stats(&mut self) {
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0usize;
        for doc in &self.snapshot.docs {
            total_len += doc.tokens.len();
            let mut seen = std::collections::HashSet::new();
            for t in &doc.tokens {
                if seen.insert(t.as_str()) {
                    *doc_freq.entry(t.clone()).or_insert(0) += 1;
                }
            }
        }
        let avg_doc_len = if self.snapshot.docs.is_empty() {
            0.0
        } else {
            total_len as f32 / self.snapshot.docs.len() as f32
        };
        self.stats = Bm25Stats { doc_freq, avg_doc_len };
        self.stats_dirty = false;
    }

    /// Top-N BM25 scoring. Zero-score documents are excluded; ties break on
    /// `doc_id` so reload cannot reorder equal scores.
    pub fn search(&mut self, query_tokens: &[String], top_n: usize) -> Vec<Bm25Hit> {
        if query_tokens.is_empty() || top_n == 0 || self.snapshot.docs.is_empty() {
            return Vec::new();
        }
        if self.stats_dirty {
            self.rebuild_stats();
        }
        let n = self.snapshot.docs.len() as f32;
        let avgdl = self.stats.avg_doc_len.max(f32::EPSILON);

        let mut hits: Vec<Bm25Hit> = Vec::new();
        for doc in &self.snapshot.docs {
            let dl = doc.tokens.len() as f32;
            let mut tf: HashMap<&str, f32> = HashMap::new();
            for t in &doc.tokens {
                *tf.entry(t.as_str()).or_insert(0.0) += 1.0;
            }
            let mut score = 0.0f32;
            for q in query_tokens {
                let Some(&f) = tf.get(q.as_str()) else { continue };
                let df = *self.stats.doc_freq.get(q).unwrap_or(&0) as f32;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                score += idf * (f * (K1 + 1.0)) / (f + K1 * (1.0 - B + B * dl / avgdl));
            }
            if score > 0.0 {
                hits.push(Bm25Hit {
                    doc_id: doc.doc_id.clone(),
                    file_id: FileId(doc.file_id.clone()),
                    kind: doc.kind,
                    score,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(top_n);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scores_and_ranks_matching_docs() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Bm25Store::load(tmp.path().join("bm25.bin"));
        let f1 = FileId::generate();
        let f2 = FileId::generate();
        store.index_chunk(&ChunkId::generate(), &f1, tokens(&["예산", "조정", "비용"]));
        store.index_chunk(&ChunkId::generate(), &f2, tokens(&["회의", "일정"]));
        store.index_file(&f2, tokens(&["scan", "zip"]));

        let hits = store.search(&tokens(&["예산"]), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_id, f1);
        assert_eq!(hits[0].kind, DocKind::Chunk);

        let hits = store.search(&tokens(&["scan"]), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, DocKind::File);
    }

    #[test]
    fn empty_token_docs_are_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Bm25Store::load(tmp.path().join("bm25.bin"));
        store.index_file(&FileId::generate(), vec![]);
        assert_eq!(store.doc_count(), 0);
    }

    #[test]
    fn remove_file_drops_both_kinds() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Bm25Store::load(tmp.path().join("bm25.bin"));
        let f = FileId::generate();
        store.index_chunk(&ChunkId::generate(), &f, tokens(&["alpha"]));
        store.index_chunk(&ChunkId::generate(), &f, tokens(&["beta"]));
        store.index_file(&f, tokens(&["alpha"]));
        assert_eq!(store.remove_file(&f), 3);
        assert!(store.search(&tokens(&["alpha"]), 10).is_empty());
        assert_eq!(store.remove_file(&f), 0);
    }

    #[test]
    fn reload_ranks_identically() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bm25.bin");
        let f1 = FileId::generate();
        let f2 = FileId::generate();
        let query = tokens(&["보고서", "예산"]);
        let first = {
            let mut store = Bm25Store::load(&path);
            store.index_chunk(&ChunkId::generate(), &f1, tokens(&["보고서", "예산", "초안"]));
            store.index_chunk(&ChunkId::generate(), &f2, tokens(&["보고서", "회의"]));
            store.index_file(&f1, tokens(&["report", "docx"]));
            store.save().unwrap();
            store.search(&query, 10)
        };
        let mut reloaded = Bm25Store::load(&path);
        let second = reloaded.search(&query, 10);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bm25.bin");
        std::fs::write(&path, b"garbage").unwrap();
        let store = Bm25Store::load(&path);
        assert_eq!(store.doc_count(), 0);
    }

    #[test]
    fn reindexing_a_doc_replaces_it() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = Bm25Store::load(tmp.path().join("bm25.bin"));
        let f = FileId::generate();
        let c = ChunkId::generate();
        store.index_chunk(&c, &f, tokens(&["old"]));
        store.index_chunk(&c, &f, tokens(&["new"]));
        assert_eq!(store.doc_count(), 1);
        assert!(store.search(&tokens(&["old"]), 10).is_empty());
        assert_eq!(store.search(&tokens(&["new"]), 10).len(), 1);
    }
}
