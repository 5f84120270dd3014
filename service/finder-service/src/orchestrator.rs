//! Indexing orchestrator. Drives each file through
//! scan → classify → extract → chunk → tokenize → embed → persist, with
//! manifest-based change detection, downgrade semantics, cooperative
//! cancellation, and per-file failure isolation.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use file_extractor::chunker::{chunk_document, DraftChunk};
use file_extractor::classify;
use file_extractor::enumerate::{enumerate_roots, EnumerateOptions};
use search_model::{
    ChunkId, ChunkRecord, FileId, FileRecord, IndexStats, ManifestEntry, ScannedFile, SourceType,
    SCHEMA_VERSION,
};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::{now_epoch, EngineContext};

/// Cooperative cancellation handle, checked at every suspension point.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Immutable progress events emitted to the caller's channel.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { files_total: usize },
    Progress {
        files_total: usize,
        done: usize,
        failed: usize,
        current_path: String,
    },
    FileFailed { path: String, error: String },
    Cancelled,
}

pub type ProgressCallback<'a> = Option<&'a mut (dyn FnMut(ProgressEvent) + Send)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingSummary {
    pub total: usize,
    pub content_indexed: usize,
    pub metadata_only: usize,
    pub failed: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IndexingOptions {
    pub include_hidden: bool,
    pub max_file_size_bytes: Option<u64>,
}

pub struct IndexingOrchestrator {
    ctx: Arc<EngineContext>,
}

impl IndexingOrchestrator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Index every root incrementally. Returns the run summary, or
    /// `Cancelled` after leaving the stores and manifest consistent.
    pub fn index_roots(
        &self,
        roots: &[PathBuf],
        options: &IndexingOptions,
        cancel: Option<&CancelToken>,
        mut progress: ProgressCallback<'_>,
    ) -> Result<IndexingSummary, EngineError> {
        let enumerate_opts = EnumerateOptions {
            include_hidden: options.include_hidden,
            max_file_size_bytes: options.max_file_size_bytes,
        };
        let scanned = enumerate_roots(roots, &enumerate_opts);

        let diff = self.lock_manifest()?.diff(&scanned);
        let mut summary = IndexingSummary {
            total: scanned.len(),
            ..Default::default()
        };
        let files_total = diff.added.len() + diff.changed.len() + diff.removed.len();
        emit(&mut progress, ProgressEvent::Started { files_total });
        info!(
            total = scanned.len(),
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "indexing pass started"
        );

        let mut done = 0usize;

        for path in &diff.removed {
            if is_cancelled(cancel) {
                return self.finish_cancelled(&mut progress, summary);
            }
            self.remove_path(path)?;
            summary.removed += 1;
            done += 1;
            emit(
                &mut progress,
                ProgressEvent::Progress {
                    files_total,
                    done,
                    failed: summary.failed,
                    current_path: path.clone(),
                },
            );
        }

        // Changed files keep their file_id; added files get a fresh one.
        let mut work: Vec<(ScannedFile, FileId)> = Vec::new();
        {
            let manifest = self.lock_manifest()?;
            for file in &diff.changed {
                let id = manifest
                    .get(&file.path)
                    .map(|e| e.file_id.clone())
                    .unwrap_or_else(FileId::generate);
                work.push((file.clone(), id));
            }
        }
        for file in &diff.added {
            work.push((file.clone(), FileId::generate()));
        }

        for (file, file_id) in work {
            if is_cancelled(cancel) {
                // The current file never reached its manifest commit, so a
                // purge keeps both stores consistent with the manifest.
                self.purge_file_data(&file_id)?;
                return self.finish_cancelled(&mut progress, summary);
            }
            match self.process_file(&file, file_id.clone(), cancel) {
                Ok(content_indexed) => {
                    if content_indexed {
                        summary.content_indexed += 1;
                    } else {
                        summary.metadata_only += 1;
                    }
                }
                Err(EngineError::Cancelled) => {
                    self.purge_file_data(&file_id)?;
                    return self.finish_cancelled(&mut progress, summary);
                }
                // Store writes failing is fatal for the whole run.
                Err(e @ EngineError::StoreWrite(_)) | Err(e @ EngineError::SchemaMismatch { .. }) => {
                    return Err(e);
                }
                Err(e) => {
                    summary.failed += 1;
                    self.log_file_error(&file.path, &e);
                    emit(
                        &mut progress,
                        ProgressEvent::FileFailed {
                            path: file.path.clone(),
                            error: e.to_string(),
                        },
                    );
                }
            }
            done += 1;
            emit(
                &mut progress,
                ProgressEvent::Progress {
                    files_total,
                    done,
                    failed: summary.failed,
                    current_path: file.path.clone(),
                },
            );
        }

        self.persist_stores()?;
        info!(?summary, "indexing pass finished");
        Ok(summary)
    }

    /// One file through the pipeline. Returns whether it ended up
    /// content-indexed. Extraction/embedding trouble downgrades the file
    /// instead of failing it; only store writes abort.
    fn process_file(
        &self,
        file: &ScannedFile,
        file_id: FileId,
        cancel: Option<&CancelToken>,
    ) -> Result<bool, EngineError> {
        // Delete-before-insert makes reingest idempotent and recovers any
        // stale partial state from a previous crash.
        self.purge_file_data(&file_id)?;

        let mut record = FileRecord {
            schema_version: SCHEMA_VERSION.into(),
            file_id: file_id.clone(),
            source: SourceType::Local,
            content_indexed: classify::is_content_indexed(&file.extension),
            path: file.path.clone(),
            filename: file.filename.clone(),
            extension: file.extension.clone(),
            size_bytes: file.size_bytes,
            created_at: file.created_at,
            modified_at: file.modified_at,
            author: None,
            fingerprint: file.fingerprint(),
            index_stats: IndexStats::default(),
        };

        if record.content_indexed {
            if is_cancelled(cancel) {
                return Err(EngineError::Cancelled);
            }
            match file_extractor::extract(std::path::Path::new(&file.path)) {
                Ok(doc) => {
                    record.author = doc.author.clone();
                    let drafts = chunk_document(&doc);
                    if drafts.is_empty() {
                        // No extractable text: discoverable by filename only.
                        record.content_indexed = false;
                    } else if let Err(e) = self.ingest_chunks(&mut record, drafts, cancel) {
                        match e {
                            EngineError::Embedding(reason) => {
                                warn!(path = %file.path, %reason, "embedding failed, downgrading to metadata-only");
                                record.content_indexed = false;
                                record.index_stats.index_error = Some(reason);
                            }
                            fatal => return Err(fatal),
                        }
                    }
                }
                Err(e) => {
                    warn!(path = %file.path, error = %e, "extraction failed, downgrading to metadata-only");
                    record.content_indexed = false;
                    record.index_stats.index_error = Some(e.to_string());
                    self.log_file_error(&file.path, &EngineError::Extraction(e.to_string()));
                }
            }
        }

        if is_cancelled(cancel) {
            return Err(EngineError::Cancelled);
        }

        // Every file gets a file-level lexical doc, metadata-only included.
        let file_tokens = self.file_level_tokens(&record);
        self.lock_bm25()?.index_file(&file_id, file_tokens);
        self.lock_vectors()?
            .upsert_file(&record)
            .map_err(EngineError::store_write)?;

        // Manifest commit happens only after both store writes succeeded.
        let now = now_epoch();
        self.lock_manifest()?.set(
            file.path.clone(),
            ManifestEntry {
                file_id,
                fingerprint: file.fingerprint(),
                last_indexed_at: now,
                content_indexed: record.content_indexed,
            },
        );
        Ok(record.content_indexed)
    }

    /// Tokenize, embed, and persist the chunks of one content file.
    /// A wholesale embedding failure surfaces as `Embedding` (the caller
    /// downgrades); individual bad chunks are dropped and the index stays
    /// dense over the survivors.
    fn ingest_chunks(
        &self,
        record: &mut FileRecord,
        drafts: Vec<DraftChunk>,
        cancel: Option<&CancelToken>,
    ) -> Result<(), EngineError> {
        if is_cancelled(cancel) {
            return Err(EngineError::Cancelled);
        }

        let texts: Vec<&str> = drafts.iter().map(|d| d.text.as_str()).collect();
        let embeddings = match self.ctx.embedder.embed_batch(&texts) {
            Ok(vecs) => vecs.into_iter().map(Some).collect::<Vec<_>>(),
            Err(batch_err) => {
                // Retry chunk by chunk; only the failing ones are dropped.
                let mut vecs = Vec::with_capacity(texts.len());
                let mut any_ok = false;
                for text in &texts {
                    match self.ctx.embedder.embed(text) {
                        Ok(v) => {
                            any_ok = true;
                            vecs.push(Some(v));
                        }
                        Err(e) => {
                            warn!(error = %e, "dropping chunk that failed to embed");
                            vecs.push(None);
                        }
                    }
                }
                if !any_ok {
                    return Err(EngineError::Embedding(batch_err.to_string()));
                }
                vecs
            }
        };

        if is_cancelled(cancel) {
            return Err(EngineError::Cancelled);
        }

        // chunk_index is assigned after drops so the sequence stays 0..N-1.
        let mut records: Vec<ChunkRecord> = Vec::with_capacity(drafts.len());
        for (draft, embedding) in drafts.into_iter().zip(embeddings) {
            let Some(embedding) = embedding else { continue };
            let tokens = self.ctx.tokenizer.tokenize(&draft.text);
            records.push(ChunkRecord {
                schema_version: SCHEMA_VERSION.into(),
                chunk_id: ChunkId::generate(),
                file_id: record.file_id.clone(),
                chunk_index: records.len() as u32,
                text: draft.text,
                embedding,
                tokens,
                location: draft.location,
            });
        }
        if records.is_empty() {
            return Err(EngineError::Embedding("every chunk failed to embed".into()));
        }

        let written = self
            .lock_vectors()?
            .insert_many(&records)
            .map_err(EngineError::store_write)?;
        {
            let mut bm25 = self.lock_bm25()?;
            for rec in &records {
                bm25.index_chunk(&rec.chunk_id, &rec.file_id, rec.tokens.clone());
            }
        }
        record.index_stats = IndexStats {
            chunk_count: written as u32,
            last_indexed_at: now_epoch(),
            index_error: None,
        };
        Ok(())
    }

    /// Filename stem, the trailing path segments, and the author feed the
    /// file-level lexical doc.
    fn file_level_tokens(&self, record: &FileRecord) -> Vec<String> {
        let stem = record
            .filename
            .strip_suffix(&record.extension)
            .unwrap_or(&record.filename);
        let mut text = stem.replace(['_', '-', '.'], " ");
        let segments: Vec<&str> = record.path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
        for seg in segments.iter().rev().take(3) {
            text.push(' ');
            text.push_str(&seg.replace(['_', '-', '.'], " "));
        }
        if let Some(author) = &record.author {
            text.push(' ');
            text.push_str(author);
        }
        self.ctx.tokenizer.tokenize(&text)
    }

    fn remove_path(&self, path: &str) -> Result<(), EngineError> {
        let entry = self.lock_manifest()?.remove(path);
        if let Some(entry) = entry {
            self.purge_file_data(&entry.file_id)?;
            self.lock_vectors()?
                .delete_file(&entry.file_id)
                .map_err(EngineError::store_write)?;
        }
        Ok(())
    }

    /// Idempotent purge of a file's chunks and lexical docs.
    fn purge_file_data(&self, file_id: &FileId) -> Result<(), EngineError> {
        self.lock_vectors()?
            .delete_by_file_id(file_id)
            .map_err(EngineError::store_write)?;
        self.lock_bm25()?.remove_file(file_id);
        Ok(())
    }

    fn persist_stores(&self) -> Result<(), EngineError> {
        self.lock_manifest()?
            .save(now_epoch())
            .map_err(EngineError::store_write)?;
        self.lock_bm25()?.save().map_err(EngineError::store_write)?;
        Ok(())
    }

    fn finish_cancelled(
        &self,
        progress: &mut ProgressCallback<'_>,
        summary: IndexingSummary,
    ) -> Result<IndexingSummary, EngineError> {
        self.persist_stores()?;
        emit(progress, ProgressEvent::Cancelled);
        info!(?summary, "indexing cancelled");
        Err(EngineError::Cancelled)
    }

    fn log_file_error(&self, path: &str, error: &EngineError) {
        let line = format!("{}\t{}\t{}\n", chrono::Utc::now().to_rfc3339(), path, error);
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.ctx.dirs.error_log_path())
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(error = %e, "could not append to indexing error log");
        }
    }

    fn lock_manifest(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, search_store::manifest::ManifestStore>, EngineError> {
        self.ctx
            .manifest
            .lock()
            .map_err(|_| EngineError::StoreWrite("manifest lock poisoned".into()))
    }

    fn lock_vectors(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, search_store::vector::VectorStore>, EngineError> {
        self.ctx
            .vectors
            .lock()
            .map_err(|_| EngineError::StoreWrite("vector store lock poisoned".into()))
    }

    fn lock_bm25(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, search_store::bm25::Bm25Store>, EngineError> {
        self.ctx
            .bm25
            .lock()
            .map_err(|_| EngineError::StoreWrite("bm25 store lock poisoned".into()))
    }
}

/// Events delivered on the controller channel.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Progress(ProgressEvent),
    Summary(IndexingSummary),
    Failed(String),
}

/// Handle returned by [`index`]: the indexing run owns a background worker
/// so the calling (UI) thread never enters the pipeline itself.
pub struct IndexingHandle {
    cancel: CancelToken,
    events: std::sync::mpsc::Receiver<ControllerEvent>,
    join: Option<std::thread::JoinHandle<Result<IndexingSummary, EngineError>>>,
}

impl IndexingHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Channel of progress/summary events for the caller to consume.
    pub fn events(&self) -> &std::sync::mpsc::Receiver<ControllerEvent> {
        &self.events
    }

    /// Block until the run completes and return its result.
    pub fn wait(mut self) -> Result<IndexingSummary, EngineError> {
        match self.join.take() {
            Some(join) => join
                .join()
                .unwrap_or_else(|_| Err(EngineError::StoreWrite("indexing worker panicked".into()))),
            None => Err(EngineError::StoreWrite("indexing worker already joined".into())),
        }
    }
}

/// Controller entry point: spawn the indexing run on a worker thread and
/// hand back a cancellable handle with an event channel.
pub fn index(
    ctx: Arc<EngineContext>,
    roots: Vec<PathBuf>,
    options: IndexingOptions,
) -> IndexingHandle {
    let cancel = CancelToken::new();
    let (tx, rx) = std::sync::mpsc::channel();
    let worker_cancel = cancel.clone();
    let join = std::thread::spawn(move || {
        let event_tx = tx.clone();
        let mut forward = move |event: ProgressEvent| {
            let _ = event_tx.send(ControllerEvent::Progress(event));
        };
        let result = IndexingOrchestrator::new(ctx).index_roots(
            &roots,
            &options,
            Some(&worker_cancel),
            Some(&mut forward),
        );
        match &result {
            Ok(summary) => {
                let _ = tx.send(ControllerEvent::Summary(*summary));
            }
            Err(e) => {
                let _ = tx.send(ControllerEvent::Failed(e.to_string()));
            }
        }
        result
    });
    IndexingHandle {
        cancel,
        events: rx,
        join: Some(join),
    }
}

fn is_cancelled(cancel: Option<&CancelToken>) -> bool {
    cancel.map(|c| c.is_cancelled()).unwrap_or(false)
}

fn emit(progress: &mut ProgressCallback<'_>, event: ProgressEvent) {
    if let Some(cb) = progress.as_mut() {
        cb(event);
    }
}
