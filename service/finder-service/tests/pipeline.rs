//! End-to-end scenarios: index a folder, search it, change files, reindex,
//! cancel, delete. Runs on the deterministic hashing embedder so no model
//! assets are required.

use std::collections::HashSet;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use embedding_provider::embedder::{Embedder, HashingEmbedder};
use finder_service::engine::{SearchEngine, SearchMode};
use finder_service::error::EngineError;
use finder_service::orchestrator::{
    CancelToken, IndexingOptions, IndexingOrchestrator, ProgressEvent,
};
use finder_service::paths::AppDirs;
use finder_service::retriever::SearchFilters;
use finder_service::EngineContext;
use search_model::{ChunkLocation, MatchType};

fn open_ctx(app_root: &Path) -> Arc<EngineContext> {
    let dirs = AppDirs::at(app_root).unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
    EngineContext::open_with_embedder(dirs, embedder, false).unwrap()
}

fn index_all(ctx: &Arc<EngineContext>, root: &Path) -> finder_service::orchestrator::IndexingSummary {
    IndexingOrchestrator::new(Arc::clone(ctx))
        .index_roots(&[root.to_path_buf()], &IndexingOptions::default(), None, None)
        .unwrap()
}

/// Minimal .docx: one Heading 1 paragraph followed by body paragraphs.
fn write_docx(path: &Path, heading: &str, body: &[&str]) {
    let mut paragraphs = format!(
        "<w:p><w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr><w:r><w:t>{heading}</w:t></w:r></w:p>"
    );
    for text in body {
        paragraphs.push_str(&format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>"));
    }
    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{paragraphs}</w:body></w:document>"
    );
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default();
    zip.start_file("word/document.xml", opts).unwrap();
    zip.write_all(document.as_bytes()).unwrap();
    zip.finish().unwrap();
}

#[test]
fn docx_query_ranks_file_first_with_section_evidence() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_docx(
        &docs.join("report_final.docx"),
        "Q4 예산",
        &["매출 감소로 인한 비용 조정"],
    );

    let ctx = open_ctx(&tmp.path().join("appdata"));
    let summary = index_all(&ctx, &docs);
    assert_eq!(summary.content_indexed, 1);
    assert_eq!(summary.failed, 0);

    let engine = SearchEngine::new(Arc::clone(&ctx));
    let response = engine.search("Q4 예산 조정", SearchMode::Smart, &SearchFilters::default());

    assert!(response.error.is_none());
    assert!(!response.results.is_empty());
    let top = &response.results[0];
    assert_eq!(top.file.filename, "report_final.docx");
    assert_eq!(top.match_type, MatchType::Hybrid);
    assert!(top.content_available);

    let evidence = top
        .evidences
        .iter()
        .find(|e| {
            matches!(&e.location, ChunkLocation::Section { header_path }
                if header_path == &vec!["Q4 예산".to_string()])
        })
        .expect("evidence under the Q4 예산 heading");
    assert!(evidence.snippet.contains("비용 조정"));
    assert!(!evidence.highlights.is_empty());
}

#[test]
fn metadata_only_file_is_found_by_name_with_decayed_score() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_docx(&docs.join("report_final.docx"), "Q4 예산", &["매출 감소로 인한 비용 조정"]);
    std::fs::write(docs.join("Q4 예산 초안.zip"), b"binary blob").unwrap();

    let ctx = open_ctx(&tmp.path().join("appdata"));
    let summary = index_all(&ctx, &docs);
    assert_eq!(summary.content_indexed, 1);
    assert_eq!(summary.metadata_only, 1);

    let engine = SearchEngine::new(Arc::clone(&ctx));
    let response = engine.search("Q4 예산", SearchMode::Smart, &SearchFilters::default());

    let names: Vec<&str> = response.results.iter().map(|r| r.file.filename.as_str()).collect();
    assert!(names.contains(&"report_final.docx"), "got {names:?}");
    assert!(names.contains(&"Q4 예산 초안.zip"), "got {names:?}");

    let zip_hit = response
        .results
        .iter()
        .find(|r| r.file.filename == "Q4 예산 초안.zip")
        .unwrap();
    assert!(!zip_hit.content_available);
    assert!(zip_hit.evidences.is_empty());
    // Sole lexical match at rank 1: contribution c = 1/(60+1); the file
    // score is c + 0.2·c and decays by 0.4 after aggregation.
    let c = 1.0f32 / 61.0;
    let expected = (c + 0.2 * c) * 0.4;
    assert!(
        (zip_hit.score - expected).abs() < 1e-6,
        "zip score {} != {expected}",
        zip_hit.score
    );
}

#[test]
fn changed_file_keeps_its_id_and_replaces_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    let path = docs.join("report_final.docx");
    write_docx(&path, "Q4 예산", &["매출 감소로 인한 비용 조정"]);

    let ctx = open_ctx(&tmp.path().join("appdata"));
    index_all(&ctx, &docs);

    let path_str = path.to_string_lossy().to_string();
    let old_id = ctx.manifest.lock().unwrap().get(&path_str).unwrap().file_id.clone();
    let old_count = ctx.vectors.lock().unwrap().chunk_count_for(&old_id).unwrap();
    assert!(old_count > 0);

    // Second pass with nothing touched writes nothing.
    let unchanged = index_all(&ctx, &docs);
    assert_eq!(unchanged.content_indexed + unchanged.metadata_only + unchanged.removed, 0);

    // Rewrite with different content (size and mtime both change).
    write_docx(
        &path,
        "Q4 예산",
        &["매출 감소로 인한 비용 조정", "추가 절감 항목 정리", "연간 전망 수정"],
    );
    let changed = index_all(&ctx, &docs);
    assert_eq!(changed.content_indexed, 1);

    let new_id = ctx.manifest.lock().unwrap().get(&path_str).unwrap().file_id.clone();
    assert_eq!(new_id, old_id, "content change at the same path keeps the file_id");

    let chunks = ctx.vectors.lock().unwrap().chunks_for_file(&new_id).unwrap();
    assert!(!chunks.is_empty());
    // Exactly one set of chunks, densely indexed 0..N-1.
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index as usize, i);
    }
    let file_record = ctx.vectors.lock().unwrap().get_file(&new_id).unwrap().unwrap();
    assert_eq!(file_record.index_stats.chunk_count as usize, chunks.len());
}

#[test]
fn cancellation_leaves_stores_consistent_with_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    for i in 0..40 {
        let body = format!("# 제목\n\n예산 문서 {i} 본문입니다\n");
        std::fs::write(docs.join(format!("note{i:02}.md")), body).unwrap();
    }

    let ctx = open_ctx(&tmp.path().join("appdata"));
    let cancel = CancelToken::new();
    let cancel_for_cb = cancel.clone();
    let mut on_progress = move |event: ProgressEvent| {
        if let ProgressEvent::Progress { done, .. } = event {
            if done >= 10 {
                cancel_for_cb.cancel();
            }
        }
    };

    let result = IndexingOrchestrator::new(Arc::clone(&ctx)).index_roots(
        &[docs.clone()],
        &IndexingOptions::default(),
        Some(&cancel),
        Some(&mut on_progress),
    );
    assert!(matches!(result, Err(EngineError::Cancelled)));

    // Every manifest entry is fully persisted; no orphans in either store.
    let manifest_ids: HashSet<String> = ctx
        .manifest
        .lock()
        .unwrap()
        .entries()
        .map(|(_, e)| e.file_id.0.clone())
        .collect();
    assert!(!manifest_ids.is_empty());
    assert!(manifest_ids.len() < 40);

    let vectors = ctx.vectors.lock().unwrap();
    for id in vectors.chunk_file_ids().unwrap() {
        assert!(manifest_ids.contains(&id.0), "orphan chunks for {}", id.0);
    }
    for (_, entry) in ctx.manifest.lock().unwrap().entries() {
        if entry.content_indexed {
            assert!(vectors.chunk_count_for(&entry.file_id).unwrap() > 0);
        }
    }
    drop(vectors);
    for id in ctx.bm25.lock().unwrap().file_ids() {
        assert!(manifest_ids.contains(&id.0), "orphan lexical docs for {}", id.0);
    }
}

#[test]
fn deleted_file_disappears_from_results_and_stores() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    let path = docs.join("report_final.docx");
    write_docx(&path, "Q4 예산", &["매출 감소로 인한 비용 조정"]);
    std::fs::write(docs.join("other.md"), "# 기타\n\n다른 문서\n").unwrap();

    let ctx = open_ctx(&tmp.path().join("appdata"));
    index_all(&ctx, &docs);
    let path_str = path.to_string_lossy().to_string();
    let file_id = ctx.manifest.lock().unwrap().get(&path_str).unwrap().file_id.clone();

    std::fs::remove_file(&path).unwrap();
    let summary = index_all(&ctx, &docs);
    assert_eq!(summary.removed, 1);

    assert!(ctx.manifest.lock().unwrap().get(&path_str).is_none());
    assert_eq!(ctx.vectors.lock().unwrap().chunk_count_for(&file_id).unwrap(), 0);
    assert!(ctx.vectors.lock().unwrap().get_file(&file_id).unwrap().is_none());
    assert!(!ctx.bm25.lock().unwrap().file_ids().iter().any(|f| f == &file_id));

    let engine = SearchEngine::new(Arc::clone(&ctx));
    let response = engine.search("비용 조정", SearchMode::Smart, &SearchFilters::default());
    assert!(!response
        .results
        .iter()
        .any(|r| r.file.filename == "report_final.docx"));
}

#[test]
fn restart_answers_identically() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    write_docx(&docs.join("a.docx"), "예산", &["비용 조정 내역"]);
    std::fs::write(docs.join("b.md"), "# 회의\n\n예산 회의 기록\n").unwrap();
    let app = tmp.path().join("appdata");

    let first = {
        let ctx = open_ctx(&app);
        index_all(&ctx, &docs);
        SearchEngine::new(ctx).search("예산", SearchMode::Smart, &SearchFilters::default())
    };
    let second = {
        let ctx = open_ctx(&app);
        SearchEngine::new(ctx).search("예산", SearchMode::Smart, &SearchFilters::default())
    };

    let ranked = |r: &search_model::SearchResponse| -> Vec<(String, f32)> {
        r.results.iter().map(|h| (h.file.file_id.0.clone(), h.score)).collect()
    };
    assert_eq!(ranked(&first), ranked(&second));
    assert!(!first.results.is_empty());
}

#[test]
fn empty_query_is_refused_and_oversized_query_is_truncated() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = open_ctx(&tmp.path().join("appdata"));
    let engine = SearchEngine::new(Arc::clone(&ctx));

    let empty = engine.search("   ", SearchMode::Smart, &SearchFilters::default());
    assert!(empty.results.is_empty());
    assert!(empty.error.is_some());

    let long = "가".repeat(513);
    let response = engine.search(&long, SearchMode::Smart, &SearchFilters::default());
    assert!(response.error.is_none());
    assert_eq!(response.query.chars().count(), 512);
}

#[test]
fn empty_stores_return_an_empty_response_normally() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = open_ctx(&tmp.path().join("appdata"));
    let engine = SearchEngine::new(ctx);
    let response = engine.search("아무것도 없음", SearchMode::Smart, &SearchFilters::default());
    assert!(response.results.is_empty());
    assert!(response.error.is_none());
}

#[test]
fn evidence_count_follows_the_mode_knob() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    let mut md = String::new();
    for i in 0..8 {
        md.push_str(&format!("# 섹션 {i}\n\n예산 관련 내용 {i}\n\n"));
    }
    std::fs::write(docs.join("long.md"), md).unwrap();

    let ctx = open_ctx(&tmp.path().join("appdata"));
    index_all(&ctx, &docs);
    let engine = SearchEngine::new(Arc::clone(&ctx));

    let fast = engine.search("예산", SearchMode::Fast, &SearchFilters::default());
    let top = &fast.results[0];
    assert!(top.evidences.len() <= 2);

    let assist = engine.search("예산", SearchMode::Assist, &SearchFilters::default());
    let top = &assist.results[0];
    assert!(top.evidences.len() <= 5);
    assert!(top.evidences.len() > 2);
}

#[test]
fn folder_prefix_filter_applies_to_both_retrievers() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(docs.join("keep")).unwrap();
    std::fs::create_dir_all(docs.join("drop")).unwrap();
    std::fs::write(docs.join("keep/a.md"), "# 예산\n\n비용 계획\n").unwrap();
    std::fs::write(docs.join("drop/b.md"), "# 예산\n\n비용 계획\n").unwrap();

    let ctx = open_ctx(&tmp.path().join("appdata"));
    index_all(&ctx, &docs);
    let engine = SearchEngine::new(Arc::clone(&ctx));

    let filters = SearchFilters {
        folder_prefixes: Some(vec![docs.join("keep").to_string_lossy().to_string()]),
        ..Default::default()
    };
    let response = engine.search("비용", SearchMode::Smart, &filters);
    assert!(!response.results.is_empty());
    assert!(response.results.iter().all(|r| r.file.path.contains("keep")));
}

#[test]
fn controller_handle_runs_on_a_worker_and_reports_events() {
    use finder_service::orchestrator::{index, ControllerEvent};

    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(docs.join("a.md"), "# 예산\n\n계획 문서\n").unwrap();

    let ctx = open_ctx(&tmp.path().join("appdata"));
    let handle = index(Arc::clone(&ctx), vec![docs], IndexingOptions::default());

    let mut saw_summary = false;
    for event in handle.events().iter() {
        if let ControllerEvent::Summary(summary) = event {
            assert_eq!(summary.content_indexed, 1);
            saw_summary = true;
        }
    }
    assert!(saw_summary);
    let summary = handle.wait().unwrap();
    assert_eq!(summary.content_indexed, 1);
}

#[test]
fn offline_self_test_passes_on_a_local_setup() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = open_ctx(&tmp.path().join("appdata"));
    finder_service::offline::self_test(&ctx).unwrap();
}
