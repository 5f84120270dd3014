//! SQLite-backed embedded store holding chunk rows (text + vector +
//! location metadata) and the persisted `FileRecord` table.
//!
//! Vector search is an exact cosine scan over the stored rows. Ties are
//! broken by `chunk_id` so a reopened store ranks identically.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, TransactionBehavior};
use search_model::{ChunkId, ChunkRecord, FileId, FileRecord};
use tracing::warn;

use crate::StoreError;

/// One dense-retrieval hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: ChunkId,
    pub file_id: FileId,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    /// Open a file-backed store at `path`, creating the schema if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "FULL")?;
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                tokens_json TEXT NOT NULL,
                location_json TEXT NOT NULL,
                content_indexed INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id);

            CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                record_json TEXT NOT NULL,
                path TEXT NOT NULL,
                extension TEXT NOT NULL,
                modified_at REAL NOT NULL,
                content_indexed INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);
            "#,
        )?;
        Ok(())
    }

    /// Append chunk rows. Rows failing record validation (empty text or
    /// missing required location metadata) are rejected: skipped with a
    /// warning, never inserted. Returns the number of rows written.
    pub fn insert_many(&mut self, rows: &[ChunkRecord]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunks
                 (chunk_id, file_id, chunk_index, text, embedding, tokens_json, location_json, content_indexed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            )?;
            for rec in rows {
                if let Err(reason) = rec.validate() {
                    warn!(chunk_id = %rec.chunk_id.0, %reason, "rejecting invalid chunk");
                    continue;
                }
                let blob: &[u8] = bytemuck::cast_slice(&rec.embedding);
                let tokens_json = serde_json::to_string(&rec.tokens)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let location_json = serde_json::to_string(&rec.location)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                stmt.execute(params![
                    rec.chunk_id.0,
                    rec.file_id.0,
                    rec.chunk_index as i64,
                    rec.text,
                    blob,
                    tokens_json,
                    location_json,
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Remove every chunk of a file. Idempotent; runs in one transaction so
    /// a concurrent search never observes a partial delete.
    pub fn delete_by_file_id(&mut self, file_id: &FileId) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let n = tx.execute("DELETE FROM chunks WHERE file_id = ?1", [file_id.0.as_str()])?;
        tx.commit()?;
        Ok(n)
    }

    /// Top-N cosine search. `content_only` restricts to rows flagged
    /// `content_indexed = 1` (all locally produced rows are).
    pub fn search(
        &self,
        query_vec: &[f32],
        top_n: usize,
        content_only: bool,
    ) -> Result<Vec<VectorHit>, StoreError> {
        if query_vec.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        let sql = if content_only {
            "SELECT chunk_id, file_id, embedding FROM chunks WHERE content_indexed = 1"
        } else {
            "SELECT chunk_id, file_id, embedding FROM chunks"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut hits: Vec<VectorHit> = Vec::new();
        while let Some(row) = rows.next()? {
            let chunk_id: String = row.get(0)?;
            let file_id: String = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            let vec = decode_vector(&blob);
            if vec.len() != query_vec.len() {
                continue;
            }
            let score = cosine(query_vec, &vec);
            hits.push(VectorHit {
                chunk_id: ChunkId(chunk_id),
                file_id: FileId(file_id),
                score,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.0.cmp(&b.chunk_id.0))
        });
        hits.truncate(top_n);
        Ok(hits)
    }

    /// Materialize chunk records, preserving the requested order.
    pub fn get_chunks_by_ids(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut placeholders = String::from("(");
        for i in 0..ids.len() {
            if i > 0 {
                placeholders.push(',');
            }
            placeholders.push('?');
        }
        placeholders.push(')');
        let sql = format!(
            "SELECT chunk_id, file_id, chunk_index, text, embedding, tokens_json, location_json
             FROM chunks WHERE chunk_id IN {placeholders}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let id_strs: Vec<&str> = ids.iter().map(|c| c.0.as_str()).collect();
        let mut found: HashMap<String, ChunkRecord> = HashMap::with_capacity(ids.len());
        let mut rows = stmt.query(rusqlite::params_from_iter(id_strs.iter()))?;
        while let Some(row) = rows.next()? {
            let chunk_id: String = row.get(0)?;
            let file_id: String = row.get(1)?;
            let chunk_index: i64 = row.get(2)?;
            let text: String = row.get(3)?;
            let blob: Vec<u8> = row.get(4)?;
            let tokens_json: String = row.get(5)?;
            let location_json: String = row.get(6)?;
            let tokens: Vec<String> = serde_json::from_str(&tokens_json).unwrap_or_default();
            let location = serde_json::from_str(&location_json)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            found.insert(
                chunk_id.clone(),
                ChunkRecord {
                    schema_version: search_model::SCHEMA_VERSION.into(),
                    chunk_id: ChunkId(chunk_id),
                    file_id: FileId(file_id),
                    chunk_index: chunk_index as u32,
                    text,
                    embedding: decode_vector(&blob),
                    tokens,
                    location,
                },
            );
        }
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rec) = found.remove(&id.0) {
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// All chunks of one file, ordered by `chunk_index`.
    pub fn chunks_for_file(&self, file_id: &FileId) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_id FROM chunks WHERE file_id = ?1 ORDER BY chunk_index",
        )?;
        let mut rows = stmt.query([file_id.0.as_str()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            ids.push(ChunkId(id));
        }
        drop(rows);
        drop(stmt);
        self.get_chunks_by_ids(&ids)
    }

    /// Distinct file ids that currently own chunk rows.
    pub fn chunk_file_ids(&self) -> Result<Vec<FileId>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT file_id FROM chunks")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            out.push(FileId(id));
        }
        Ok(out)
    }

    pub fn chunk_count_for(&self, file_id: &FileId) -> Result<u32, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT count(*) FROM chunks WHERE file_id = ?1",
            [file_id.0.as_str()],
            |r| r.get(0),
        )?;
        Ok(n as u32)
    }

    /// Insert or replace the persisted record for one file.
    pub fn upsert_file(&mut self, file: &FileRecord) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(file).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO files (file_id, record_json, path, extension, modified_at, content_indexed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(file_id) DO UPDATE SET
                 record_json = excluded.record_json,
                 path = excluded.path,
                 extension = excluded.extension,
                 modified_at = excluded.modified_at,
                 content_indexed = excluded.content_indexed",
            params![
                file.file_id.0,
                json,
                file.path,
                file.extension,
                file.modified_at,
                file.content_indexed as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_file(&self, file_id: &FileId) -> Result<Option<FileRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT record_json FROM files WHERE file_id = ?1")?;
        let mut rows = stmt.query([file_id.0.as_str()])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                let rec =
                    serde_json::from_str(&json).map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(Some(rec))
            }
            None => Ok(None),
        }
    }

    pub fn list_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT record_json FROM files ORDER BY path")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let json: String = row.get(0)?;
            match serde_json::from_str(&json) {
                Ok(rec) => out.push(rec),
                Err(e) => warn!(error = %e, "skipping unreadable file record"),
            }
        }
        Ok(out)
    }

    pub fn delete_file(&mut self, file_id: &FileId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM files WHERE file_id = ?1", [file_id.0.as_str()])?;
        Ok(())
    }
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_model::{ChunkLocation, SCHEMA_VERSION};

    fn chunk(file: &FileId, idx: u32, vec: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            schema_version: SCHEMA_VERSION.into(),
            chunk_id: ChunkId::generate(),
            file_id: file.clone(),
            chunk_index: idx,
            text: format!("chunk {idx}"),
            embedding: vec,
            tokens: vec![],
            location: ChunkLocation::Page { page: idx + 1 },
        }
    }

    #[test]
    fn insert_search_delete() {
        let mut store = VectorStore::open_in_memory().unwrap();
        let file = FileId::generate();
        store
            .insert_many(&[
                chunk(&file, 0, vec![1.0, 0.0]),
                chunk(&file, 1, vec![0.0, 1.0]),
            ])
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, true).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].file_id, file);

        assert_eq!(store.delete_by_file_id(&file).unwrap(), 2);
        assert!(store.search(&[1.0, 0.0], 10, true).unwrap().is_empty());
        // Deleting again is a no-op.
        assert_eq!(store.delete_by_file_id(&file).unwrap(), 0);
    }

    #[test]
    fn invalid_rows_are_rejected_not_inserted() {
        let mut store = VectorStore::open_in_memory().unwrap();
        let file = FileId::generate();
        let mut bad = chunk(&file, 0, vec![1.0, 0.0]);
        bad.location = ChunkLocation::Sheet { sheet: "".into(), row_range: "1-2".into() };
        let good = chunk(&file, 1, vec![0.5, 0.5]);
        let written = store.insert_many(&[bad, good]).unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.chunk_count_for(&file).unwrap(), 1);
    }

    #[test]
    fn reopen_returns_identical_ranking() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("chunks.db");
        let file = FileId::generate();
        let first = {
            let mut store = VectorStore::open(&db).unwrap();
            store
                .insert_many(&[
                    chunk(&file, 0, vec![0.9, 0.1]),
                    chunk(&file, 1, vec![0.1, 0.9]),
                    chunk(&file, 2, vec![0.7, 0.3]),
                ])
                .unwrap();
            store.search(&[1.0, 0.0], 3, true).unwrap()
        };
        let store = VectorStore::open(&db).unwrap();
        let second = store.search(&[1.0, 0.0], 3, true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn file_records_roundtrip() {
        let mut store = VectorStore::open_in_memory().unwrap();
        let file_id = FileId::generate();
        let rec = FileRecord {
            schema_version: SCHEMA_VERSION.into(),
            file_id: file_id.clone(),
            source: search_model::SourceType::Local,
            content_indexed: false,
            path: "/docs/scan.zip".into(),
            filename: "scan.zip".into(),
            extension: ".zip".into(),
            size_bytes: 42,
            created_at: 1.0,
            modified_at: 2.0,
            author: None,
            fingerprint: search_model::Fingerprint {
                size_bytes: 42,
                modified_at: 2.0,
                hash: None,
            },
            index_stats: Default::default(),
        };
        store.upsert_file(&rec).unwrap();
        assert_eq!(store.get_file(&file_id).unwrap().unwrap(), rec);
        assert_eq!(store.list_files().unwrap().len(), 1);
        store.delete_file(&file_id).unwrap();
        assert!(store.get_file(&file_id).unwrap().is_none());
    }

    #[test]
    fn dimension_mismatch_rows_are_ignored_in_search() {
        let mut store = VectorStore::open_in_memory().unwrap();
        let file = FileId::generate();
        store
            .insert_many(&[chunk(&file, 0, vec![1.0, 0.0, 0.0])])
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 10, true).unwrap();
        assert!(hits.is_empty());
    }
}
